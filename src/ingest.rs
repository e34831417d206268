//! Ingesta de los CVs de un directorio en el índice vectorial: extracción,
//! fragmentación, embeddings por fuente y escritura en lotes.

use std::{
    fmt,
    path::{Component, Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{anyhow, Result};
use futures::{stream, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::{
    app_state::{Services, Status},
    chunker,
    config::PipelineConfig,
    error::PipelineError,
    models::{Chunk, Document, IndexRecord, IndexStats},
    vector_store::VectorIndex,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Indexed,
    /// Algún lote falló tras agotar los reintentos; los demás quedaron escritos.
    PartiallyIndexed { failed_batches: usize },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source_id: String,
    pub chunks: usize,
    pub records_written: usize,
    pub outcome: SourceOutcome,
}

impl SourceReport {
    fn skipped(source_id: &str, reason: impl Into<String>) -> Self {
        Self {
            source_id: source_id.to_string(),
            chunks: 0,
            records_written: 0,
            outcome: SourceOutcome::Skipped {
                reason: reason.into(),
            },
        }
    }
}

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Default, Serialize)]
pub struct IngestionSummary {
    pub files_scanned: u32,
    pub files_ingested: u32,
    pub files_skipped: u32,
    pub chunks_created: usize,
    pub records_written: usize,
    pub failed_batches: usize,
    pub per_source: Vec<SourceReport>,
    pub index_stats: Option<IndexStats>,
}

impl IngestionSummary {
    fn record(&mut self, report: SourceReport) {
        match &report.outcome {
            SourceOutcome::Skipped { .. } => self.files_skipped += 1,
            SourceOutcome::Indexed => self.files_ingested += 1,
            SourceOutcome::PartiallyIndexed { failed_batches } => {
                self.files_ingested += 1;
                self.failed_batches += failed_batches;
            }
        }
        self.chunks_created += report.chunks;
        self.records_written += report.records_written;
        self.per_source.push(report);
    }
}

/// Implementa cómo se mostrará el resumen como texto.
impl fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Resumen: {} CVs escaneados, {} ingeridos, {} omitidos. {} fragmentos, {} registros escritos, {} lotes fallidos.",
            self.files_scanned,
            self.files_ingested,
            self.files_skipped,
            self.chunks_created,
            self.records_written,
            self.failed_batches
        )?;
        if let Some(stats) = &self.index_stats {
            write!(
                f,
                " Índice: {} vectores en total, {} en el espacio de nombres.",
                stats.total_records, stats.namespace_records
            )?;
        }
        Ok(())
    }
}

/// Recorre recursivamente un directorio (en orden de nombre) e ingiere cada fichero.
pub async fn ingest_directory(
    services: &Services,
    cfg: &PipelineConfig,
    root: &Path,
    status: Arc<Mutex<Status>>,
) -> Result<IngestionSummary> {
    if !root.is_dir() {
        return Err(anyhow!("La ruta no es un directorio: {}", root.display()));
    }

    let sources: Vec<PathBuf> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();

    if sources.is_empty() {
        warn!("No se encontraron ficheros en {}", root.display());
    }

    ingest_sources(services, cfg, root, &sources, status).await
}

/// Ingiere las fuentes en el orden dado. Un fallo en una fuente nunca aborta
/// la ejecución: queda reflejado en el resumen.
///
/// El `source_id` de cada fuente es su ruta relativa a `root`, de modo que dos
/// CVs homónimos en subcarpetas distintas no comparten identificadores.
pub async fn ingest_sources(
    services: &Services,
    cfg: &PipelineConfig,
    root: &Path,
    sources: &[PathBuf],
    status: Arc<Mutex<Status>>,
) -> Result<IngestionSummary> {
    cfg.validate()?;

    let mut summary = IngestionSummary::default();
    let total = sources.len().max(1) as f32;

    for (index, path) in sources.iter().enumerate() {
        summary.files_scanned += 1;
        let source_id = source_id_of(root, path);
        let progress = (index + 1) as f32 / total;
        set_status(
            &status,
            format!("[{}/{}] Procesando: {}...", index + 1, sources.len(), source_id),
            progress,
        );

        let report = match ingest_source(services, cfg, path, &source_id).await {
            Ok(report) => report,
            Err(err) => {
                error!("Error ingiriendo {}: {err:#}", path.display());
                SourceReport::skipped(&source_id, err.to_string())
            }
        };

        if let SourceOutcome::Skipped { reason } = &report.outcome {
            set_status(
                &status,
                format!("[{}/{}] Omitido: {} ({reason})", index + 1, sources.len(), source_id),
                progress,
            );
        }
        summary.record(report);
    }

    match services.index.stats(&cfg.namespace).await {
        Ok(stats) => summary.index_stats = Some(stats),
        Err(err) => warn!("No se pudieron obtener estadísticas del índice: {err:#}"),
    }

    info!("{summary}");
    Ok(summary)
}

async fn ingest_source(
    services: &Services,
    cfg: &PipelineConfig,
    path: &Path,
    source_id: &str,
) -> Result<SourceReport> {
    let raw_text = match services.extractor.extract(path) {
        Ok(text) => text,
        Err(err) => {
            warn!("{err:#}. Saltando fichero.");
            return Ok(SourceReport::skipped(source_id, "extracción fallida"));
        }
    };
    if raw_text.trim().is_empty() {
        warn!("Fichero vacío o sin texto útil: {}", path.display());
        return Ok(SourceReport::skipped(source_id, "sin texto"));
    }

    let document = Document {
        source_id: source_id.to_string(),
        raw_text,
    };
    let texts = chunker::chunk_text(&document.raw_text, cfg.chunk_size, cfg.chunk_overlap)?;
    if texts.is_empty() {
        warn!("No se generaron fragmentos para {}", document.source_id);
        return Ok(SourceReport::skipped(source_id, "sin fragmentos"));
    }
    let chunk_count = texts.len();

    // Un único lote de embeddings por fuente.
    let vectors = services
        .embedder
        .embed(&texts)
        .await
        .map_err(PipelineError::Embedding)?;
    if vectors.len() != chunk_count {
        return Err(anyhow!(
            "Número de embeddings ({}) distinto al número de fragmentos ({chunk_count})",
            vectors.len()
        ));
    }

    let label = candidate_label_of(path);
    let records: Vec<IndexRecord> = texts
        .into_iter()
        .zip(vectors)
        .enumerate()
        .filter_map(|(chunk_index, (text, vector))| {
            Chunk {
                source_id: document.source_id.clone(),
                chunk_index,
                text,
                vector: Some(vector),
            }
            .into_record(&label, cfg.metadata_text_cap)
        })
        .collect();

    let (records_written, failed_batches) =
        write_batches(services.index.as_ref(), cfg, &records).await;

    let outcome = if failed_batches == 0 {
        info!("Ingerido {} con {chunk_count} fragmentos.", path.display());
        SourceOutcome::Indexed
    } else {
        warn!(
            "Ingerido {} parcialmente: {failed_batches} lotes fallidos.",
            path.display()
        );
        SourceOutcome::PartiallyIndexed { failed_batches }
    };

    Ok(SourceReport {
        source_id: source_id.to_string(),
        chunks: chunk_count,
        records_written,
        outcome,
    })
}

/// Escribe en lotes de `upsert_batch_size`, con hasta `write_concurrency` en
/// vuelo. Devuelve (registros escritos, lotes fallidos).
async fn write_batches(
    index: &dyn VectorIndex,
    cfg: &PipelineConfig,
    records: &[IndexRecord],
) -> (usize, usize) {
    let pending: Vec<_> = records
        .chunks(cfg.upsert_batch_size)
        .map(|batch| upsert_with_retry(index, cfg, batch))
        .collect();
    let results: Vec<Result<usize>> = stream::iter(pending)
        .buffered(cfg.write_concurrency)
        .collect()
        .await;

    results
        .into_iter()
        .fold((0, 0), |(written, failed), result| match result {
            Ok(n) => (written + n, failed),
            Err(err) => {
                error!("Lote descartado: {err:#}");
                (written, failed + 1)
            }
        })
}

async fn upsert_with_retry(
    index: &dyn VectorIndex,
    cfg: &PipelineConfig,
    batch: &[IndexRecord],
) -> Result<usize> {
    let mut attempt = 0;
    loop {
        match index.upsert(&cfg.namespace, batch).await {
            Ok(()) => return Ok(batch.len()),
            Err(err) if attempt < cfg.upsert_retries => {
                attempt += 1;
                warn!(
                    "Fallo escribiendo lote de {} registros (intento {attempt}/{}): {err:#}",
                    batch.len(),
                    cfg.upsert_retries
                );
                tokio::time::sleep(Duration::from_millis(cfg.upsert_backoff_ms * attempt as u64))
                    .await;
            }
            Err(err) => return Err(err),
        }
    }
}

fn source_id_of(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        path.to_string_lossy().to_string()
    } else {
        parts.join("/")
    }
}

/// Nombre del fichero sin extensión: identifica al profesor en el contexto.
fn candidate_label_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn set_status(status: &Arc<Mutex<Status>>, message: String, progress: f32) {
    if let Ok(mut status) = status.lock() {
        status.message = message;
        status.progress = progress;
    }
}
