//! Agrupa los fragmentos recuperados por candidato y los formatea para el prompt.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::RetrievalHit;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CandidateContext {
    /// Texto listo para sustituir `{CV_TEXT}`.
    pub context: String,
    /// Candidatos en el orden en que aparecen en `context`.
    pub candidates: Vec<String>,
}

/// Respeta el orden de llegada: los candidatos salen en el orden en que se
/// vieron por primera vez y sus fragmentos en el orden recibido. No reordena
/// por puntuación ni elimina textos repetidos.
pub fn aggregate(hits: &[RetrievalHit]) -> CandidateContext {
    let mut groups: Vec<(String, Vec<&str>)> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for hit in hits {
        let label = label_of(hit);
        let slot = *position.entry(label.clone()).or_insert_with(|| {
            groups.push((label, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(hit.metadata.text.as_str());
    }

    let mut context = String::new();
    for (label, excerpts) in &groups {
        context.push_str(&format!("### CANDIDATE: {label}\n"));
        context.push_str("RELEVANT EXCERPTS:\n");
        for excerpt in excerpts {
            context.push_str(&format!("...{excerpt}...\n"));
        }
        context.push('\n');
    }

    CandidateContext {
        context,
        candidates: groups.into_iter().map(|(label, _)| label).collect(),
    }
}

fn label_of(hit: &RetrievalHit) -> String {
    let meta = &hit.metadata;
    if !meta.candidate_label.is_empty() {
        meta.candidate_label.clone()
    } else if !meta.source_id.is_empty() {
        meta.source_id.clone()
    } else {
        "Unknown".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn hit(label: &str, text: &str, score: f64) -> RetrievalHit {
        RetrievalHit {
            id: format!("{label}-{text}"),
            score,
            metadata: ChunkMetadata {
                source_id: format!("{label}.pdf"),
                chunk_index: 0,
                text: text.to_string(),
                candidate_label: label.to_string(),
            },
        }
    }

    #[test]
    fn first_seen_order_and_intra_group_order() {
        let hits = vec![hit("B", "b1", 0.9), hit("A", "a1", 0.8), hit("B", "b2", 0.95)];
        let ctx = aggregate(&hits);

        assert_eq!(ctx.candidates, vec!["B", "A"]);
        assert_eq!(
            ctx.context,
            "### CANDIDATE: B\nRELEVANT EXCERPTS:\n...b1...\n...b2...\n\n\
             ### CANDIDATE: A\nRELEVANT EXCERPTS:\n...a1...\n\n"
        );
    }

    #[test]
    fn duplicate_texts_are_kept() {
        let ctx = aggregate(&[hit("A", "igual", 0.5), hit("A", "igual", 0.4)]);
        assert_eq!(ctx.context.matches("...igual...").count(), 2);
    }

    #[test]
    fn missing_label_falls_back_to_source_then_unknown() {
        let mut no_label = hit("", "x", 0.1);
        no_label.metadata.source_id = "perez.pdf".into();
        let mut nothing = hit("", "y", 0.1);
        nothing.metadata.source_id.clear();

        let ctx = aggregate(&[no_label, nothing]);
        assert_eq!(ctx.candidates, vec!["perez.pdf", "Unknown"]);
    }

    #[test]
    fn no_hits_no_context() {
        let ctx = aggregate(&[]);
        assert!(ctx.context.is_empty());
        assert!(ctx.candidates.is_empty());
    }
}
