use sha2::{Digest, Sha256};

/// Identificador estable de un fragmento: SHA-256 hexadecimal de
/// `"{source_id}_{chunk_index}"`. Es la clave primaria en el índice, así que
/// reingerir un CV sin cambios sobrescribe en lugar de duplicar.
pub fn id_for(source_id: &str, chunk_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{source_id}_{chunk_index}").as_bytes());
    hex::encode(hasher.finalize())
}
