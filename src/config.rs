//! Carga y validación de la configuración de la aplicación (índice, embeddings,
//! LLM y parámetros del pipeline de fragmentación/recuperación).

use std::{env, path::PathBuf, str::FromStr};

use crate::error::{PipelineError, PipelineResult};

#[derive(Clone, Debug)]
pub enum IndexBackend {
    Neo4j {
        uri: String,
        user: String,
        password: String,
    },
    Local {
        path: PathBuf,
    },
}

impl IndexBackend {
    fn from_env() -> PipelineResult<Self> {
        let kind = env::var("INDEX_BACKEND").unwrap_or_else(|_| "neo4j".to_string());
        match kind.to_lowercase().as_str() {
            "neo4j" => Ok(Self::Neo4j {
                uri: env::var("NEO4J_URI").unwrap_or_default(),
                user: env::var("NEO4J_USER").unwrap_or_default(),
                password: env::var("NEO4J_PASSWORD").unwrap_or_default(),
            }),
            "local" => Ok(Self::Local {
                path: PathBuf::from(
                    env::var("LOCAL_INDEX_PATH")
                        .unwrap_or_else(|_| "data/output/cv_index.json".to_string()),
                ),
            }),
            other => Err(PipelineError::Config(format!(
                "INDEX_BACKEND no soportado: {other}"
            ))),
        }
    }
}

/// Límite de fragmentos por consulta, venga de la configuración o de la API.
pub const MAX_TOP_K: usize = 1000;

/// Parámetros del pipeline de fragmentación, escritura y recuperación.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Palabras por fragmento.
    pub chunk_size: usize,
    /// Palabras compartidas entre fragmentos consecutivos.
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub namespace: String,
    pub upsert_batch_size: usize,
    /// Máximo de caracteres del texto copiado en los metadatos del registro.
    pub metadata_text_cap: usize,
    pub upsert_retries: u32,
    pub upsert_backoff_ms: u64,
    pub write_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 300,
            chunk_overlap: 50,
            top_k: 10,
            namespace: "isen-faculty".to_string(),
            upsert_batch_size: 100,
            metadata_text_cap: 1000,
            upsert_retries: 3,
            upsert_backoff_ms: 500,
            write_concurrency: 1,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> PipelineResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            chunk_size: env_or("CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: env_or("CHUNK_OVERLAP", defaults.chunk_overlap)?,
            top_k: env_or("TOP_K_CHUNKS", defaults.top_k)?,
            namespace: env::var("INDEX_NAMESPACE").unwrap_or(defaults.namespace),
            upsert_batch_size: env_or("UPSERT_BATCH_SIZE", defaults.upsert_batch_size)?,
            metadata_text_cap: env_or("METADATA_TEXT_CAP", defaults.metadata_text_cap)?,
            upsert_retries: env_or("UPSERT_RETRIES", defaults.upsert_retries)?,
            upsert_backoff_ms: env_or("UPSERT_BACKOFF_MS", defaults.upsert_backoff_ms)?,
            write_concurrency: env_or("WRITE_CONCURRENCY", defaults.write_concurrency)?,
        })
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.chunk_size == 0 {
            return Err(PipelineError::Config("CHUNK_SIZE debe ser mayor que 0".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(PipelineError::Config(format!(
                "CHUNK_OVERLAP ({}) debe ser menor que CHUNK_SIZE ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 || self.top_k > MAX_TOP_K {
            return Err(PipelineError::Config(format!(
                "TOP_K_CHUNKS debe estar entre 1 y {MAX_TOP_K}"
            )));
        }
        if self.upsert_batch_size == 0 {
            return Err(PipelineError::Config("UPSERT_BATCH_SIZE debe ser mayor que 0".into()));
        }
        if self.write_concurrency == 0 {
            return Err(PipelineError::Config("WRITE_CONCURRENCY debe ser mayor que 0".into()));
        }
        if self.metadata_text_cap == 0 {
            return Err(PipelineError::Config("METADATA_TEXT_CAP debe ser mayor que 0".into()));
        }
        if self.namespace.trim().is_empty() {
            return Err(PipelineError::Config("INDEX_NAMESPACE no puede estar vacío".into()));
        }
        Ok(())
    }
}

/// Endpoint OpenAI-compatible para la evaluación de candidatos.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: String,
    pub chat_model: String,
    pub timeout_secs: u64,
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub cv_dir: PathBuf,
    pub awards_dir: PathBuf,
    pub prompt_template: PathBuf,

    pub index_backend: IndexBackend,

    pub openai_api_key: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,

    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    ///
    /// Sólo falla ante valores mal formados; la presencia de credenciales se
    /// comprueba en [`AppConfig::validate`].
    pub fn from_env() -> PipelineResult<Self> {
        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3322".to_string());
        let cv_dir = PathBuf::from(env::var("CV_DIR").unwrap_or_else(|_| "data/cv".to_string()));
        let awards_dir =
            PathBuf::from(env::var("AWARDS_DIR").unwrap_or_else(|_| "data/output".to_string()));
        let prompt_template = PathBuf::from(
            env::var("PROMPT_TEMPLATE")
                .unwrap_or_else(|_| "prompts/award_to_cvs_prompt.md".to_string()),
        );

        let llm = LlmConfig {
            api_url: env::var("LLM_API_URL")
                .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string()),
            api_key: env::var("LLM_API_KEY").unwrap_or_default(),
            chat_model: env::var("LLM_CHAT_MODEL")
                .unwrap_or_else(|_| "google/gemini-flash-1.5".to_string()),
            timeout_secs: env_or("LLM_TIMEOUT_SECS", 60)?,
        };

        Ok(Self {
            server_addr,
            cv_dir,
            awards_dir,
            prompt_template,
            index_backend: IndexBackend::from_env()?,
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            embedding_model: env::var("LLM_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            embedding_dimension: env_or("EMBEDDING_DIMENSION", 1536)?,
            llm,
            pipeline: PipelineConfig::from_env()?,
        })
    }

    /// Valida credenciales y parámetros. Se ejecuta una vez, antes de ingerir o consultar.
    pub fn validate(&self) -> PipelineResult<()> {
        let mut missing = Vec::new();
        if self.openai_api_key.is_empty() {
            missing.push("OPENAI_API_KEY");
        }
        if self.llm.api_key.is_empty() {
            missing.push("LLM_API_KEY");
        }
        if let IndexBackend::Neo4j { uri, user, password } = &self.index_backend {
            if uri.is_empty() {
                missing.push("NEO4J_URI");
            }
            if user.is_empty() {
                missing.push("NEO4J_USER");
            }
            if password.is_empty() {
                missing.push("NEO4J_PASSWORD");
            }
        }
        if !missing.is_empty() {
            return Err(PipelineError::Config(format!(
                "Faltan variables de entorno obligatorias: {}",
                missing.join(", ")
            )));
        }
        if self.embedding_dimension == 0 {
            return Err(PipelineError::Config(
                "EMBEDDING_DIMENSION debe ser mayor que 0".into(),
            ));
        }
        self.pipeline.validate()
    }

    /// Comprobación adicional para la ingesta: el directorio de CVs debe existir.
    pub fn validate_for_ingest(&self) -> PipelineResult<()> {
        self.validate()?;
        if !self.cv_dir.is_dir() {
            return Err(PipelineError::Config(format!(
                "No existe el directorio de CVs: {}",
                self.cv_dir.display()
            )));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> PipelineResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| PipelineError::Config(format!("Valor inválido para {key}: '{raw}'"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            server_addr: "127.0.0.1:0".into(),
            cv_dir: PathBuf::from("data/cv"),
            awards_dir: PathBuf::from("data/output"),
            prompt_template: PathBuf::from("prompts/award_to_cvs_prompt.md"),
            index_backend: IndexBackend::Local {
                path: PathBuf::from("index.json"),
            },
            openai_api_key: "sk-test".into(),
            embedding_model: "text-embedding-3-small".into(),
            embedding_dimension: 8,
            llm: LlmConfig {
                api_url: "http://localhost".into(),
                api_key: "key".into(),
                chat_model: "model".into(),
                timeout_secs: 5,
            },
            pipeline: PipelineConfig::default(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        let mut cfg = base_config();
        cfg.pipeline.chunk_size = 50;
        cfg.pipeline.chunk_overlap = 50;
        assert!(matches!(cfg.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn top_k_above_limit_is_rejected() {
        let mut cfg = base_config();
        cfg.pipeline.top_k = MAX_TOP_K + 1;
        assert!(matches!(cfg.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn missing_credentials_are_listed() {
        let mut cfg = base_config();
        cfg.llm.api_key.clear();
        cfg.index_backend = IndexBackend::Neo4j {
            uri: "bolt://localhost:7687".into(),
            user: String::new(),
            password: "secret".into(),
        };
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("LLM_API_KEY"));
        assert!(err.contains("NEO4J_USER"));
        assert!(!err.contains("NEO4J_PASSWORD"));
    }

    #[test]
    fn ingest_requires_existing_cv_dir() {
        let mut cfg = base_config();
        cfg.cv_dir = PathBuf::from("/definitely/not/here");
        assert!(matches!(cfg.validate_for_ingest(), Err(PipelineError::Config(_))));

        let tmp = tempfile::tempdir().unwrap();
        cfg.cv_dir = tmp.path().to_path_buf();
        assert!(cfg.validate_for_ingest().is_ok());
    }
}
