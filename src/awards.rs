//! Descripciones de convocatorias: un `.txt` por premio en `AWARDS_DIR`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::error::PipelineError;

#[derive(Debug, Clone, Serialize)]
pub struct AwardFile {
    pub name: String,
    pub path: PathBuf,
}

/// Lista los `.txt` del directorio, ordenados por nombre.
pub fn list_awards(dir: &Path) -> Result<Vec<AwardFile>> {
    if !dir.is_dir() {
        return Err(anyhow!("No existe el directorio de convocatorias: {}", dir.display()));
    }

    let mut awards: Vec<AwardFile> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
        })
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().to_string();
            Some(AwardFile { name, path })
        })
        .collect();
    awards.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(awards)
}

/// Lee una convocatoria por nombre de fichero. Sólo se aceptan nombres
/// simples, sin componentes de ruta.
pub fn load_award(dir: &Path, name: &str) -> Result<String> {
    let candidate = Path::new(name);
    let is_plain = candidate.components().count() == 1
        && candidate.file_name().is_some_and(|f| f == candidate.as_os_str());
    if name.is_empty() || !is_plain {
        return Err(PipelineError::InvalidArgument(format!(
            "Nombre de convocatoria no válido: '{name}'"
        ))
        .into());
    }

    let path = dir.join(name);
    let text = fs::read_to_string(&path)
        .map_err(|e| anyhow!("No se pudo leer la convocatoria {}: {e}", path.display()))?;
    if text.trim().is_empty() {
        return Err(PipelineError::InvalidArgument(format!("La convocatoria '{name}' está vacía")).into());
    }
    Ok(text)
}
