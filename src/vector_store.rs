//! Índices vectoriales para los fragmentos de CV.
//!
//! API pública:
//!   - `VectorIndex` (`upsert`, `query`, `stats`), con espacio de nombres por departamento.
//!   - `Neo4jVectorIndex`: nodos `:CvChunk` con índice vectorial coseno.
//!   - `LocalVectorIndex`: índice en proceso, opcionalmente persistido en JSON.

use std::{
    cmp::Ordering,
    collections::BTreeMap,
    ffi::OsString,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use neo4rs::{query, Graph};
use tracing::{debug, info};

use crate::{
    models::{ChunkMetadata, IndexMatch, IndexRecord, IndexStats},
    neo4j_client::CHUNK_VECTOR_INDEX,
};

/// Un `upsert` con un `id` ya existente en el espacio de nombres sobrescribe el registro.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, namespace: &str, records: &[IndexRecord]) -> Result<()>;
    /// Hasta `k` filas, de mayor a menor similitud.
    async fn query(&self, namespace: &str, vector: &[f64], k: usize) -> Result<Vec<IndexMatch>>;
    async fn stats(&self, namespace: &str) -> Result<IndexStats>;
}

// ---------------------------------------------------------------------
// NEO4J
// ---------------------------------------------------------------------

/// El índice vectorial de Neo4j no filtra por propiedad, así que se piden más
/// vecinos de los necesarios y se filtra el espacio de nombres después.
const NAMESPACE_OVERSAMPLE: usize = 4;

#[derive(Clone)]
pub struct Neo4jVectorIndex {
    graph: Arc<Graph>,
}

impl Neo4jVectorIndex {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl VectorIndex for Neo4jVectorIndex {
    async fn upsert(&self, namespace: &str, records: &[IndexRecord]) -> Result<()> {
        let ingested_at = Utc::now().to_rfc3339();
        let tx = self.graph.start_txn().await?;

        for record in records {
            tx.run(
                query(
                    "MERGE (c:CvChunk {id: $id, namespace: $namespace})
                     SET c.embedding = $embedding, c.source_id = $source_id,
                         c.chunk_index = $chunk_index, c.text = $text,
                         c.candidate_label = $candidate_label,
                         c.ingested_at = datetime($ingested_at)",
                )
                .param("id", record.id.clone())
                .param("namespace", namespace)
                .param("embedding", record.vector.clone())
                .param("source_id", record.metadata.source_id.clone())
                .param("chunk_index", record.metadata.chunk_index as i64)
                .param("text", record.metadata.text.clone())
                .param("candidate_label", record.metadata.candidate_label.clone())
                .param("ingested_at", ingested_at.clone()),
            )
            .await?;
        }

        tx.commit().await?;
        debug!("{} registros escritos en Neo4j ({namespace})", records.len());
        Ok(())
    }

    async fn query(&self, namespace: &str, vector: &[f64], k: usize) -> Result<Vec<IndexMatch>> {
        let (limit, candidates) = neo4j_limits(k)?;
        let mut cursor = self
            .graph
            .execute(
                query(
                    "CALL db.index.vector.queryNodes($index_name, $candidates, $embedding)
                     YIELD node, score
                     WHERE node.namespace = $namespace
                     RETURN node.id AS id, score, node.source_id AS source_id,
                            node.chunk_index AS chunk_index, node.text AS text,
                            node.candidate_label AS candidate_label
                     ORDER BY score DESC
                     LIMIT $k",
                )
                .param("index_name", CHUNK_VECTOR_INDEX)
                .param("candidates", candidates)
                .param("embedding", vector.to_vec())
                .param("namespace", namespace)
                .param("k", limit),
            )
            .await?;

        let mut output = Vec::new();
        while let Some(row) = cursor.next().await? {
            let score: f64 = row
                .get("score")
                .ok_or_else(|| anyhow!("Falta campo 'score' en resultado de Neo4j"))?;
            let id: Option<String> = row.get("id");
            let source_id: Option<String> = row.get("source_id");
            let chunk_index: Option<i64> = row.get("chunk_index");
            let text: Option<String> = row.get("text");
            let candidate_label: Option<String> = row.get("candidate_label");

            // Nodos sin propiedades completas no cuentan como vecinos válidos.
            let metadata = match (source_id, chunk_index, text) {
                (Some(source_id), Some(chunk_index), Some(text)) if chunk_index >= 0 => {
                    Some(ChunkMetadata {
                        candidate_label: candidate_label.unwrap_or_default(),
                        source_id,
                        chunk_index: chunk_index as usize,
                        text,
                    })
                }
                _ => None,
            };
            output.push(IndexMatch {
                id: id.unwrap_or_default(),
                score,
                metadata,
            });
        }

        Ok(output)
    }

    async fn stats(&self, namespace: &str) -> Result<IndexStats> {
        let mut cursor = self
            .graph
            .execute(
                query(
                    "MATCH (c:CvChunk)
                     RETURN count(c) AS total,
                            count(CASE WHEN c.namespace = $namespace THEN 1 END) AS in_namespace",
                )
                .param("namespace", namespace),
            )
            .await?;

        let row = cursor
            .next()
            .await?
            .ok_or_else(|| anyhow!("Neo4j no devolvió estadísticas"))?;
        let total: i64 = row.get("total").unwrap_or_default();
        let in_namespace: i64 = row.get("in_namespace").unwrap_or_default();

        Ok(IndexStats {
            total_records: total.max(0) as u64,
            namespace_records: in_namespace.max(0) as u64,
        })
    }
}

/// `LIMIT` y número de candidatos para `queryNodes`, como enteros de Cypher.
fn neo4j_limits(k: usize) -> Result<(i64, i64)> {
    let limit = i64::try_from(k).map_err(|_| anyhow!("k fuera de rango para Neo4j: {k}"))?;
    let candidates = i64::try_from(k.saturating_mul(NAMESPACE_OVERSAMPLE))
        .map_err(|_| anyhow!("k fuera de rango para Neo4j: {k}"))?;
    Ok((limit, candidates))
}

// ---------------------------------------------------------------------
// LOCAL
// ---------------------------------------------------------------------

type Namespaces = BTreeMap<String, BTreeMap<String, IndexRecord>>;

/// Búsqueda exhaustiva por similitud coseno. Con `path` se vuelca a disco tras
/// cada `upsert` y se recarga al abrir.
pub struct LocalVectorIndex {
    path: Option<PathBuf>,
    namespaces: Mutex<Namespaces>,
    // Serializa los volcados: la última instantánea tomada es la última escrita.
    persist_lock: tokio::sync::Mutex<()>,
}

impl LocalVectorIndex {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            namespaces: Mutex::new(Namespaces::new()),
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let namespaces = if path.exists() {
            let raw = fs::read_to_string(path)?;
            let loaded: Namespaces = serde_json::from_str(&raw)
                .map_err(|e| anyhow!("Índice local corrupto en {}: {e}", path.display()))?;
            info!(
                "Índice local cargado desde {} ({} espacios de nombres)",
                path.display(),
                loaded.len()
            );
            loaded
        } else {
            Namespaces::new()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            namespaces: Mutex::new(namespaces),
            persist_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Namespaces>> {
        self.namespaces
            .lock()
            .map_err(|_| anyhow!("Mutex del índice local envenenado"))
    }
}

#[async_trait]
impl VectorIndex for LocalVectorIndex {
    async fn upsert(&self, namespace: &str, records: &[IndexRecord]) -> Result<()> {
        let _persisting = self.persist_lock.lock().await;

        let snapshot = {
            let mut namespaces = self.lock()?;
            let entries = namespaces.entry(namespace.to_string()).or_default();
            for record in records {
                entries.insert(record.id.clone(), record.clone());
            }
            match &self.path {
                Some(_) => Some(serde_json::to_vec(&*namespaces)?),
                None => None,
            }
        };

        if let (Some(path), Some(bytes)) = (self.path.clone(), snapshot) {
            tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
                .await
                .map_err(|e| anyhow!("Tarea de volcado del índice local abortada: {e}"))??;
        }
        Ok(())
    }

    async fn query(&self, namespace: &str, vector: &[f64], k: usize) -> Result<Vec<IndexMatch>> {
        let namespaces = self.lock()?;
        let Some(entries) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut scored = Vec::with_capacity(entries.len());
        for record in entries.values() {
            if record.vector.len() != vector.len() {
                return Err(anyhow!(
                    "Dimensión de la consulta ({}) distinta a la del índice ({})",
                    vector.len(),
                    record.vector.len()
                ));
            }
            scored.push((cosine_similarity(vector, &record.vector), record));
        }
        scored.sort_by(|(sa, ra), (sb, rb)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| ra.id.cmp(&rb.id))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, record)| IndexMatch {
                id: record.id.clone(),
                score,
                metadata: Some(record.metadata.clone()),
            })
            .collect())
    }

    async fn stats(&self, namespace: &str) -> Result<IndexStats> {
        let namespaces = self.lock()?;
        Ok(IndexStats {
            total_records: namespaces.values().map(|n| n.len() as u64).sum(),
            namespace_records: namespaces.get(namespace).map_or(0, |n| n.len() as u64),
        })
    }
}

/// Escribe en un fichero hermano y lo renombra sobre el destino: una escritura
/// interrumpida nunca deja el índice a medias.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = temp_sibling(path);
    let mut file = fs::File::create(&tmp_path)
        .map_err(|e| anyhow!("No se pudo crear {}: {e}", tmp_path.display()))?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
