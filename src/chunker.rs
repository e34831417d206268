//! Fragmentación por ventanas de palabras solapadas.

use crate::error::{PipelineError, PipelineResult};

/// Divide `text` en ventanas de como mucho `size` palabras que avanzan
/// `size - overlap` palabras cada vez.
///
/// La última ventana se emite aunque sea más corta y ninguna la sigue. Falla si
/// `size == 0` o `overlap >= size`, porque la ventana nunca avanzaría.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> PipelineResult<Vec<String>> {
    if size == 0 || overlap >= size {
        return Err(PipelineError::Config(format!(
            "Parámetros de fragmentación inválidos: size={size}, overlap={overlap}"
        )));
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    let step = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + size).min(words.len());
        let chunk = words[start..end].join(" ");
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
        if start + size >= words.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}
