//! Extracción de texto plano desde los ficheros de CV.

use std::{fs, path::Path};

use anyhow::{anyhow, Result};
use mime_guess::MimeGuess;
use tracing::debug;

/// Convierte un fichero en texto. Un error significa "fichero ilegible"; el
/// pipeline lo trata como texto vacío y pasa al siguiente.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String>;
}

/// Extractor por defecto: PDF con `pdf-extract`, cualquier `text/*` como UTF-8.
#[derive(Debug, Clone, Default)]
pub struct FileTextExtractor;

impl TextExtractor for FileTextExtractor {
    fn extract(&self, path: &Path) -> Result<String> {
        let mime = MimeGuess::from_path(path)
            .first()
            .ok_or_else(|| anyhow!("Tipo de fichero desconocido: {}", path.display()))?;
        debug!("Extrayendo {} ({})", path.display(), mime);

        if mime.essence_str() == "application/pdf" {
            // pdf-extract puede hacer panic con PDFs malformados.
            std::panic::catch_unwind(|| pdf_extract::extract_text(path))
                .map_err(|_| anyhow!("PDF corrupto: {}", path.display()))?
                .map_err(|e| anyhow!("No se pudo extraer texto del PDF {}: {e}", path.display()))
        } else if mime.type_().as_str() == "text" {
            fs::read_to_string(path)
                .map_err(|e| anyhow!("Fichero no legible como UTF-8 {}: {e}", path.display()))
        } else {
            Err(anyhow!("Extensión no soportada ('{}'): {}", mime, path.display()))
        }
    }
}
