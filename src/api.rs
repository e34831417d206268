use std::path::PathBuf;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::spawn;
use tracing::{error, info};

use crate::{
    app_state::{AppState, Status},
    awards::{self, AwardFile},
    error::PipelineError,
    ingest, prompt,
    rag::{self, MatchOutcome},
};

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads de la API ---

#[derive(Deserialize, Default)]
pub struct IngestPayload {
    path: Option<String>,
}

#[derive(Deserialize)]
pub struct MatchPayload {
    award_text: Option<String>,
    award_file: Option<String>,
    top_k: Option<usize>,
}

#[derive(Serialize)]
pub struct MatchResponse {
    evaluation: String,
    candidates: Vec<String>,
    hits: usize,
}

impl From<MatchOutcome> for MatchResponse {
    fn from(outcome: MatchOutcome) -> Self {
        Self {
            evaluation: outcome.evaluation,
            candidates: outcome.candidates,
            hits: outcome.hits.len(),
        }
    }
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/ingest", post(ingest_handler))
        .route("/api/status", get(status_handler))
        .route("/api/index-stats", get(index_stats_handler))
        .route("/api/awards", get(awards_handler))
        .route("/api/match", post(match_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

fn pipeline_error(err: PipelineError) -> ApiError {
    let status = match &err {
        PipelineError::Config(_) | PipelineError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        PipelineError::NoContext => StatusCode::NOT_FOUND,
        PipelineError::LlmTransport(_) | PipelineError::LlmResponse(_) => StatusCode::BAD_GATEWAY,
        PipelineError::Retrieval(_) => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::Embedding(_) | PipelineError::Template { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error!("Error en el emparejamiento: {err:#}");
    api_error(status, err.to_string())
}

// --- Handlers ---

#[axum::debug_handler]
async fn ingest_handler(
    State(state): State<AppState>,
    payload: Option<Json<IngestPayload>>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let root_dir = payload
        .path
        .map(PathBuf::from)
        .unwrap_or_else(|| state.config.cv_dir.clone());
    if !root_dir.is_dir() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "La ruta proporcionada no es un directorio válido.",
        ));
    }

    {
        let mut status = state
            .status
            .lock()
            .map_err(|_| api_error(StatusCode::INTERNAL_SERVER_ERROR, "Estado no disponible."))?;
        if status.is_busy {
            return Err(api_error(StatusCode::CONFLICT, "Ya hay una indexación en curso."));
        }
        status.is_busy = true;
        status.message = "Iniciando indexación...".to_string();
        status.progress = 0.0;
    }

    spawn(async move {
        let result = ingest::ingest_directory(
            &state.services,
            &state.config.pipeline,
            &root_dir,
            state.status.clone(),
        )
        .await;

        if let Ok(mut status) = state.status.lock() {
            status.is_busy = false;
            status.progress = 0.0;
            match result {
                Ok(summary) => {
                    status.message = format!("¡Indexación completada! {summary}");
                }
                Err(err) => {
                    status.message = format!("Error en la indexación: {err}");
                    error!("Error de ingesta: {err:#}");
                }
            }
        }
    });

    Ok(StatusCode::ACCEPTED)
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Result<Json<Status>, ApiError> {
    state
        .status
        .lock()
        .map(|s| Json(s.clone()))
        .map_err(|_| api_error(StatusCode::INTERNAL_SERVER_ERROR, "Estado no disponible."))
}

#[axum::debug_handler]
async fn index_stats_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let namespace = &state.config.pipeline.namespace;
    match state.services.index.stats(namespace).await {
        Ok(stats) => Ok(Json(json!({
            "namespace": namespace,
            "total_records": stats.total_records,
            "namespace_records": stats.namespace_records,
        }))),
        Err(e) => {
            error!("Error consultando estadísticas del índice: {e:#}");
            Err(api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
        }
    }
}

#[axum::debug_handler]
async fn awards_handler(State(state): State<AppState>) -> Result<Json<Vec<AwardFile>>, ApiError> {
    awards::list_awards(&state.config.awards_dir)
        .map(Json)
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e.to_string()))
}

#[axum::debug_handler]
async fn match_handler(
    State(state): State<AppState>,
    Json(payload): Json<MatchPayload>,
) -> Result<Json<MatchResponse>, ApiError> {
    let award_text = match (payload.award_text, payload.award_file) {
        (Some(text), _) if !text.trim().is_empty() => text,
        (_, Some(name)) => awards::load_award(&state.config.awards_dir, &name)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?,
        _ => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "Indique 'award_text' o 'award_file'.",
            ))
        }
    };

    let template = prompt::load_template(&state.config.prompt_template).map_err(pipeline_error)?;
    let top_k = payload.top_k.unwrap_or(state.config.pipeline.top_k);

    rag::match_award(
        &state.services,
        &state.config.pipeline.namespace,
        &template,
        &award_text,
        top_k,
    )
    .await
    .map(|outcome| Json(outcome.into()))
    .map_err(pipeline_error)
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state.shutdown_sender.lock().ok().and_then(|mut s| s.take()) {
        let _ = sender.send(());
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::{AppConfig, IndexBackend, LlmConfig, PipelineConfig},
        testing::{services_with, MapExtractor, RecordingChat},
        vector_store::LocalVectorIndex,
    };

    fn state(awards_dir: PathBuf, prompt_template: PathBuf) -> AppState {
        let config = AppConfig {
            server_addr: "127.0.0.1:0".into(),
            cv_dir: PathBuf::from("data/cv"),
            awards_dir,
            prompt_template,
            index_backend: IndexBackend::Local {
                path: PathBuf::from("unused.json"),
            },
            openai_api_key: "sk".into(),
            embedding_model: "m".into(),
            embedding_dimension: 16,
            llm: LlmConfig {
                api_url: "http://localhost".into(),
                api_key: "k".into(),
                chat_model: "m".into(),
                timeout_secs: 1,
            },
            pipeline: PipelineConfig::default(),
        };
        AppState {
            config,
            services: crate::app_state::Services {
                chat: Arc::new(RecordingChat::replying("evaluación")),
                ..services_with(MapExtractor::default(), Arc::new(LocalVectorIndex::in_memory()))
            },
            status: Status::shared(),
            shutdown_sender: Arc::new(Mutex::new(None)),
        }
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn match_without_award_is_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let app = create_router(state(tmp.path().into(), tmp.path().join("p.md")));
        let res = app.oneshot(post_json("/api/match", json!({}))).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn match_on_empty_index_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let template = tmp.path().join("p.md");
        std::fs::write(&template, "{AWARD_TEXT}\n{CV_TEXT}").unwrap();
        let app = create_router(state(tmp.path().into(), template));

        let res = app
            .oneshot(post_json("/api/match", json!({ "award_text": "Research Excellence" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oversized_top_k_is_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let template = tmp.path().join("p.md");
        std::fs::write(&template, "{AWARD_TEXT}\n{CV_TEXT}").unwrap();
        let app = create_router(state(tmp.path().into(), template));

        let body = json!({ "award_text": "Research Excellence", "top_k": u64::MAX });
        let res = app.oneshot(post_json("/api/match", body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ingest_rejects_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let app = create_router(state(tmp.path().into(), tmp.path().join("p.md")));
        let res = app
            .oneshot(post_json("/api/ingest", json!({ "path": "/no/existe" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
