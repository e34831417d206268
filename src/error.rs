//! Taxonomía de errores del pipeline de emparejamiento.
//!
//! La fontanería con los colaboradores externos usa `anyhow`; aquí sólo viven
//! las categorías que el llamador necesita distinguir.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Credenciales o rutas ausentes, parámetros imposibles. Aborta antes de trabajar.
    #[error("Error de configuración: {0}")]
    Config(String),

    #[error("Argumento inválido: {0}")]
    InvalidArgument(String),

    #[error("Error generando embeddings: {0}")]
    Embedding(#[source] anyhow::Error),

    /// El índice no respondió a la consulta. Fatal para esa petición.
    #[error("Error consultando el índice vectorial: {0}")]
    Retrieval(#[source] anyhow::Error),

    /// La recuperación no devolvió ningún fragmento; no se llama al LLM.
    #[error("No se encontraron fragmentos de CV relevantes para la convocatoria")]
    NoContext,

    #[error("No se pudo leer la plantilla de prompt {path}: {source}")]
    Template {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error de transporte con el LLM: {0}")]
    LlmTransport(#[from] reqwest::Error),

    /// Respuesta del LLM sin el campo esperado; el cuerpo se conserva tal cual.
    #[error("Respuesta inesperada del LLM: {0}")]
    LlmResponse(String),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
