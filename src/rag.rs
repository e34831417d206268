//! Emparejamiento RAG convocatoria → profesorado.
//!
//! Flujo:
//!   1. Embedding de la convocatoria y búsqueda de los `top_k` fragmentos de CV más cercanos.
//!   2. Agrupación de los fragmentos por candidato.
//!   3. Construcción del prompt a partir de la plantilla.
//!   4. El LLM evalúa a los candidatos con ese contexto.

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    app_state::Services,
    config::MAX_TOP_K,
    context,
    error::{PipelineError, PipelineResult},
    llm::Embedder,
    models::RetrievalHit,
    prompt,
    vector_store::VectorIndex,
};

/// Devuelve como mucho `k` aciertos, en el orden del índice. Las filas que no
/// corresponden a un registro válido se descartan.
pub async fn retrieve(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    namespace: &str,
    query_text: &str,
    k: usize,
) -> PipelineResult<Vec<RetrievalHit>> {
    if k == 0 || k > MAX_TOP_K {
        return Err(PipelineError::InvalidArgument(format!(
            "top_k debe estar entre 1 y {MAX_TOP_K}"
        )));
    }
    if query_text.trim().is_empty() {
        return Err(PipelineError::InvalidArgument(
            "El texto de la convocatoria está vacío".into(),
        ));
    }

    // 1) Embedding de la consulta
    let query_vec = embedder
        .embed(&[query_text.to_string()])
        .await
        .map_err(PipelineError::Embedding)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            PipelineError::Embedding(anyhow::anyhow!("No se pudo generar embedding de la consulta"))
        })?;

    // 2) Búsqueda de vecinos
    let matches = index
        .query(namespace, &query_vec, k)
        .await
        .map_err(PipelineError::Retrieval)?;

    let total = matches.len();
    let hits: Vec<RetrievalHit> = matches
        .into_iter()
        .filter_map(|m| match m.metadata {
            Some(metadata) if !m.id.is_empty() => Some(RetrievalHit {
                id: m.id,
                score: m.score,
                metadata,
            }),
            _ => None,
        })
        .take(k)
        .collect();

    if hits.len() < total {
        warn!("{} posiciones inválidas descartadas del resultado", total - hits.len());
    }
    Ok(hits)
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    pub evaluation: String,
    pub candidates: Vec<String>,
    pub hits: Vec<RetrievalHit>,
}

/// Empareja una convocatoria con el profesorado indexado. Si la recuperación
/// falla o no encuentra nada, el error se devuelve antes de llamar al LLM.
pub async fn match_award(
    services: &Services,
    namespace: &str,
    template: &str,
    award_text: &str,
    top_k: usize,
) -> PipelineResult<MatchOutcome> {
    let hits = retrieve(
        services.embedder.as_ref(),
        services.index.as_ref(),
        namespace,
        award_text,
        top_k,
    )
    .await?;
    if hits.is_empty() {
        return Err(PipelineError::NoContext);
    }

    let bundle = context::aggregate(&hits);
    info!("Coincidencias relevantes en: {:?}", bundle.candidates);

    let final_prompt = prompt::assemble(template, award_text, &bundle.context);
    let evaluation = services.chat.complete(&final_prompt).await?;

    Ok(MatchOutcome {
        evaluation,
        candidates: bundle.candidates,
        hits,
    })
}
