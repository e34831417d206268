//! Dobles deterministas de los colaboradores externos para los tests.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::{
    app_state::Services,
    error::{PipelineError, PipelineResult},
    extract::TextExtractor,
    llm::{ChatCompleter, Embedder},
    models::{IndexMatch, IndexRecord, IndexStats},
    vector_store::{LocalVectorIndex, VectorIndex},
};

pub fn services_with<E, I>(extractor: E, index: Arc<I>) -> Services
where
    E: TextExtractor + 'static,
    I: VectorIndex + 'static,
{
    Services {
        extractor: Arc::new(extractor),
        embedder: Arc::new(HashEmbedder),
        index,
        chat: Arc::new(RecordingChat::replying("ok")),
    }
}

#[derive(Default)]
pub struct MapExtractor {
    files: HashMap<PathBuf, Option<String>>,
}

impl MapExtractor {
    pub fn with_text(mut self, path: &str, text: &str) -> Self {
        self.files.insert(PathBuf::from(path), Some(text.to_string()));
        self
    }

    pub fn with_failure(mut self, path: &str) -> Self {
        self.files.insert(PathBuf::from(path), None);
        self
    }
}

impl TextExtractor for MapExtractor {
    fn extract(&self, path: &Path) -> Result<String> {
        match self.files.get(path) {
            Some(Some(text)) => Ok(text.clone()),
            _ => Err(anyhow!("PDF corrupto: {}", path.display())),
        }
    }
}

/// Bolsa de palabras con hashing en 16 dimensiones.
pub struct HashEmbedder;

pub const HASH_DIM: usize = 16;

pub fn hash_vector(text: &str) -> Vec<f64> {
    let mut v = vec![0.0; HASH_DIM];
    for word in text.split_whitespace() {
        let bucket = word.bytes().fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
        v[bucket % HASH_DIM] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        Ok(texts.iter().map(|t| hash_vector(t)).collect())
    }
}

/// Índice en memoria cuyo `upsert` número `fail_on` (desde 1) falla.
pub struct FlakyIndex {
    inner: LocalVectorIndex,
    fail_on: usize,
    calls: AtomicUsize,
}

impl FlakyIndex {
    pub fn failing_call(fail_on: usize) -> Self {
        Self {
            inner: LocalVectorIndex::in_memory(),
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn stored(&self) -> u64 {
        self.inner
            .stats("isen-faculty")
            .await
            .map(|s| s.total_records)
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorIndex for FlakyIndex {
    async fn upsert(&self, namespace: &str, records: &[IndexRecord]) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(anyhow!("timeout escribiendo el lote"));
        }
        self.inner.upsert(namespace, records).await
    }

    async fn query(&self, namespace: &str, vector: &[f64], k: usize) -> Result<Vec<IndexMatch>> {
        self.inner.query(namespace, vector, k).await
    }

    async fn stats(&self, namespace: &str) -> Result<IndexStats> {
        self.inner.stats(namespace).await
    }
}

/// Índice que devuelve siempre las mismas filas, válidas o no.
pub struct FixedIndex(pub Vec<IndexMatch>);

#[async_trait]
impl VectorIndex for FixedIndex {
    async fn upsert(&self, _namespace: &str, _records: &[IndexRecord]) -> Result<()> {
        Ok(())
    }

    async fn query(&self, _namespace: &str, _vector: &[f64], _k: usize) -> Result<Vec<IndexMatch>> {
        Ok(self.0.clone())
    }

    async fn stats(&self, _namespace: &str) -> Result<IndexStats> {
        Ok(IndexStats::default())
    }
}

/// Índice caído.
pub struct DownIndex;

#[async_trait]
impl VectorIndex for DownIndex {
    async fn upsert(&self, _namespace: &str, _records: &[IndexRecord]) -> Result<()> {
        Err(anyhow!("conexión rechazada"))
    }

    async fn query(&self, _namespace: &str, _vector: &[f64], _k: usize) -> Result<Vec<IndexMatch>> {
        Err(anyhow!("conexión rechazada"))
    }

    async fn stats(&self, _namespace: &str) -> Result<IndexStats> {
        Err(anyhow!("conexión rechazada"))
    }
}

/// Guarda los prompts recibidos y responde con un texto fijo o un error.
pub struct RecordingChat {
    reply: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl RecordingChat {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn broken() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatCompleter for RecordingChat {
    async fn complete(&self, prompt: &str) -> PipelineResult<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.reply
            .clone()
            .ok_or_else(|| PipelineError::LlmResponse(r#"{"error":"quota"}"#.to_string()))
    }
}
