use std::{fs, path::Path};

use crate::error::{PipelineError, PipelineResult};

pub const AWARD_PLACEHOLDER: &str = "{AWARD_TEXT}";
pub const CONTEXT_PLACEHOLDER: &str = "{CV_TEXT}";

/// Sustituye literalmente `{AWARD_TEXT}` y `{CV_TEXT}` en una sola pasada: el
/// texto insertado nunca se vuelve a examinar.
///
/// Si a la plantilla le falta algún marcador, el valor correspondiente se
/// añade al final separado por una línea en blanco, primero la convocatoria y
/// después el contexto.
pub fn assemble(template: &str, award_text: &str, context: &str) -> String {
    let substitutions = [(AWARD_PLACEHOLDER, award_text), (CONTEXT_PLACEHOLDER, context)];
    let mut prompt = String::with_capacity(template.len() + award_text.len() + context.len());
    let mut rest = template;

    while let Some((at, placeholder, value)) = substitutions
        .iter()
        .filter_map(|(placeholder, value)| rest.find(placeholder).map(|at| (at, *placeholder, *value)))
        .min_by_key(|(at, _, _)| *at)
    {
        prompt.push_str(&rest[..at]);
        prompt.push_str(value);
        rest = &rest[at + placeholder.len()..];
    }
    prompt.push_str(rest);

    for (placeholder, value) in substitutions {
        if !template.contains(placeholder) {
            prompt.push_str("\n\n");
            prompt.push_str(value);
        }
    }
    prompt
}

pub fn load_template(path: &Path) -> PipelineResult<String> {
    fs::read_to_string(path)
        .map(|t| t.trim().to_string())
        .map_err(|source| PipelineError::Template {
            path: path.display().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_both_placeholders() {
        assert_eq!(assemble("Q:{AWARD_TEXT} C:{CV_TEXT}", "X", "Y"), "Q:X C:Y");
    }

    #[test]
    fn template_without_placeholders_appends_query_then_context() {
        assert_eq!(assemble("Evalúa:", "X", "Y"), "Evalúa:\n\nX\n\nY");
    }

    #[test]
    fn only_missing_placeholder_is_appended() {
        assert_eq!(assemble("Premio: {AWARD_TEXT}", "X", "Y"), "Premio: X\n\nY");
        assert_eq!(assemble("CVs: {CV_TEXT}", "X", "Y"), "CVs: Y\n\nX");
    }

    #[test]
    fn inserted_text_is_not_reexpanded() {
        assert_eq!(
            assemble("{AWARD_TEXT}|{CV_TEXT}", "usa {CV_TEXT}", "ctx {AWARD_TEXT}"),
            "usa {CV_TEXT}|ctx {AWARD_TEXT}"
        );
    }

    #[test]
    fn repeated_placeholders_are_all_replaced() {
        assert_eq!(assemble("{AWARD_TEXT}/{CV_TEXT}/{AWARD_TEXT}", "X", "Y"), "X/Y/X");
    }

    #[test]
    fn template_is_trimmed_on_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("prompt.md");
        fs::write(&path, "\n  Evalúa {AWARD_TEXT} con {CV_TEXT}\n\n").unwrap();
        assert_eq!(load_template(&path).unwrap(), "Evalúa {AWARD_TEXT} con {CV_TEXT}");
        assert!(matches!(
            load_template(&tmp.path().join("nope.md")),
            Err(PipelineError::Template { .. })
        ));
    }
}
