use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::oneshot;
use tracing::info;

use crate::{
    config::{AppConfig, IndexBackend},
    extract::{FileTextExtractor, TextExtractor},
    llm::{ChatCompleter, ChatCompletionsClient, Embedder, RigEmbedder},
    neo4j_client,
    vector_store::{LocalVectorIndex, Neo4jVectorIndex, VectorIndex},
};

/// Colaboradores externos detrás de sus interfaces.
#[derive(Clone)]
pub struct Services {
    pub extractor: Arc<dyn TextExtractor>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub chat: Arc<dyn ChatCompleter>,
}

impl Services {
    /// Construye los clientes reales. Con Neo4j también asegura el esquema.
    pub async fn from_config(cfg: &AppConfig) -> Result<Self> {
        let index: Arc<dyn VectorIndex> = match &cfg.index_backend {
            IndexBackend::Neo4j { uri, user, password } => {
                let graph = neo4j_client::connect(uri, user, password).await?;
                neo4j_client::ensure_schema(&graph, cfg.embedding_dimension).await?;
                Arc::new(Neo4jVectorIndex::new(Arc::new(graph)))
            }
            IndexBackend::Local { path } => {
                info!("Usando índice local en {}", path.display());
                Arc::new(LocalVectorIndex::open(path)?)
            }
        };

        Ok(Self {
            extractor: Arc::new(FileTextExtractor),
            embedder: Arc::new(RigEmbedder::new(
                &cfg.openai_api_key,
                cfg.embedding_model.clone(),
            )),
            index,
            chat: Arc::new(ChatCompletionsClient::new(&cfg.llm)?),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub services: Services,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}

impl Status {
    pub fn shared() -> Arc<Mutex<Status>> {
        Arc::new(Mutex::new(Status {
            is_busy: false,
            message: "Servidor listo.".to_string(),
            progress: 0.0,
        }))
    }
}
