//! Modelos de dominio: documentos, fragmentos, registros del índice y aciertos.

use serde::{Deserialize, Serialize};

/// Texto plano extraído de un CV.
#[derive(Debug, Clone)]
pub struct Document {
    /// Nombre del fichero (o identificador estable) del que procede el texto.
    pub source_id: String,
    pub raw_text: String,
}

/// Un fragmento de un documento, todavía sin persistir.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub source_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub vector: Option<Vec<f64>>,
}

impl Chunk {
    /// Construye el registro persistible. Devuelve `None` mientras el vector
    /// no se haya calculado, de modo que nunca se escribe un registro a medias.
    pub fn into_record(self, candidate_label: &str, text_cap: usize) -> Option<IndexRecord> {
        let vector = self.vector?;
        Some(IndexRecord {
            id: crate::chunk_id::id_for(&self.source_id, self.chunk_index),
            vector,
            metadata: ChunkMetadata {
                text: truncate_chars(&self.text, text_cap),
                source_id: self.source_id,
                chunk_index: self.chunk_index,
                candidate_label: candidate_label.to_string(),
            },
        })
    }
}

/// Metadatos que acompañan a cada vector en el índice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_id: String,
    pub chunk_index: usize,
    /// Copia del texto limitada a `metadata_text_cap` caracteres.
    pub text: String,
    pub candidate_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub vector: Vec<f64>,
    pub metadata: ChunkMetadata,
}

/// Fila cruda devuelta por el índice. `metadata` es `None` cuando la posición
/// no corresponde a un registro válido.
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub id: String,
    pub score: f64,
    pub metadata: Option<ChunkMetadata>,
}

/// Acierto de recuperación ya validado.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalHit {
    pub id: String,
    pub score: f64,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub total_records: u64,
    pub namespace_records: u64,
}

/// Recorta por caracteres (no por bytes) para no partir un carácter UTF-8.
pub fn truncate_chars(text: &str, cap: usize) -> String {
    match text.char_indices().nth(cap) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("añoñá", 3), "año");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 3), "abc");
    }

    #[test]
    fn chunk_without_vector_is_not_persistable() {
        let chunk = Chunk {
            source_id: "cv1.pdf".into(),
            chunk_index: 0,
            text: "hola".into(),
            vector: None,
        };
        assert!(chunk.into_record("cv1", 10).is_none());
    }

    #[test]
    fn record_carries_capped_text_and_stable_id() {
        let chunk = Chunk {
            source_id: "cv1.pdf".into(),
            chunk_index: 2,
            text: "uno dos tres".into(),
            vector: Some(vec![0.1, 0.2]),
        };
        let record = chunk.into_record("cv1", 3).unwrap();
        assert_eq!(record.id, crate::chunk_id::id_for("cv1.pdf", 2));
        assert_eq!(record.metadata.text, "uno");
        assert_eq!(record.metadata.candidate_label, "cv1");
        assert_eq!(record.metadata.chunk_index, 2);
    }
}
