//! Colaboradores de IA: embeddings vía Rig (OpenAI) y evaluación de candidatos
//! contra un endpoint `/chat/completions` compatible con OpenAI.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rig::embeddings::EmbeddingModel; // <- para .embed_texts
use rig::providers::openai::{self, TEXT_EMBEDDING_3_SMALL};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::{
    config::LlmConfig,
    error::{PipelineError, PipelineResult},
};

/// Un vector por texto, en el mismo orden que la entrada.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>>;
}

/// Envía un único mensaje de usuario y devuelve el texto generado.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete(&self, prompt: &str) -> PipelineResult<String>;
}

// ---------------------------------------------------------------------
// EMBEDDINGS
// ---------------------------------------------------------------------

/// Embeddings de OpenAI a través de Rig, con la clave de la configuración.
#[derive(Clone)]
pub struct RigEmbedder {
    client: openai::Client,
    model: String,
}

impl RigEmbedder {
    pub fn new(api_key: &str, model: impl Into<String>) -> Self {
        Self {
            client: openai::Client::new(api_key),
            model: model.into(),
        }
    }

    /// Modelo configurado o `text-embedding-3-small` si no hay ninguno.
    pub fn model_name(&self) -> &str {
        if self.model.is_empty() {
            TEXT_EMBEDDING_3_SMALL
        } else {
            self.model.as_str()
        }
    }
}

#[async_trait]
impl Embedder for RigEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        // Trait para client.embedding_model(...)
        use rig::client::EmbeddingsClient as _;

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model_name = self.model_name();
        let embedding_model = self.client.embedding_model(model_name);

        let embeddings = embedding_model.embed_texts(texts.to_vec()).await?;
        if embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                embeddings.len(),
                texts.len()
            ));
        }
        debug!("{} embeddings generados con {model_name}", embeddings.len());

        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }
}

// ---------------------------------------------------------------------
// CHAT / COMPLETION
// ---------------------------------------------------------------------

/// Cliente HTTP para OpenRouter, la API de TAMU o cualquier proveedor con el
/// mismo contrato de `/chat/completions`.
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    cfg: LlmConfig,
}

impl ChatCompletionsClient {
    pub fn new(cfg: &LlmConfig) -> PipelineResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            cfg: cfg.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.cfg.api_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatCompleter for ChatCompletionsClient {
    async fn complete(&self, prompt: &str) -> PipelineResult<String> {
        info!("Llamando al LLM ({})...", self.cfg.chat_model);

        let body = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.cfg.api_key)
            .json(&json!({
                "model": self.cfg.chat_model,
                "messages": [{ "role": "user", "content": prompt }],
                "stream": false,
            }))
            .send()
            .await?
            .text()
            .await?;

        completion_text(&body)
    }
}

/// Extrae `choices[0].message.content`. Cualquier otra forma de respuesta se
/// devuelve íntegra como error, sin maquillar.
pub fn completion_text(body: &str) -> PipelineResult<String> {
    serde_json::from_str::<Value>(body)
        .ok()
        .as_ref()
        .and_then(|v| v.pointer("/choices/0/message/content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PipelineError::LlmResponse(body.to_string()))
}
