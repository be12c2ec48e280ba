//! Almacén de FAQs curadas: colección YAML editable a mano como fuente de
//! verdad, más un índice de búsqueda derivado en JSON con las preguntas
//! normalizadas. El índice es una caché regenerable, nunca autoritativo.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::models::FaqEntry;

/// Resultado de una consulta al almacén de FAQs. Distingue explícitamente
/// "no hay coincidencia" de "el almacén no está disponible" para que el
/// orquestador y los tests puedan afirmar sobre el modo de fallo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaqLookup {
    Hit(String),
    NoMatch,
    Unavailable(String),
}

/// Normaliza texto para comparación: recorta, colapsa espacios internos
/// y pasa a minúsculas.
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Entrada del índice derivado: pregunta ya normalizada + respuesta.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct FaqIndexEntry {
    q: String,
    a: String,
}

pub struct FaqStore {
    faq_path: PathBuf,
    index_path: PathBuf,
}

impl FaqStore {
    pub fn new(faq_path: PathBuf, index_path: PathBuf) -> Self {
        Self {
            faq_path,
            index_path,
        }
    }

    /// Carga la colección completa de FAQs. Si el fichero aún no existe
    /// se devuelve una lista vacía, no un error.
    pub fn load(&self) -> Result<Vec<FaqEntry>> {
        if !self.faq_path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.faq_path)
            .with_context(|| format!("No se pudo leer {}", self.faq_path.display()))?;
        let entries: Vec<FaqEntry> = serde_yaml::from_str(&raw)
            .with_context(|| format!("YAML de FAQs malformado en {}", self.faq_path.display()))?;
        Ok(entries)
    }

    /// Fusiona `items` en la colección existente usando la pregunta original
    /// exacta como clave (el último upsert gana), persiste la colección y
    /// reconstruye el índice. Devuelve el número total de entradas.
    pub fn upsert(&self, items: &[FaqEntry]) -> Result<usize> {
        let mut entries = self.load()?;
        for item in items {
            match entries.iter_mut().find(|e| e.q == item.q) {
                Some(existing) => existing.a = item.a.clone(),
                None => entries.push(item.clone()),
            }
        }

        let yaml = serde_yaml::to_string(&entries)?;
        atomic_write(&self.faq_path, yaml.as_bytes())?;
        self.rebuild_index(&entries)?;

        Ok(entries.len())
    }

    /// Reconstruye el índice de búsqueda a partir de la colección dada.
    /// Se escribe en una ruta temporal y se renombra, de modo que un lector
    /// concurrente nunca observa un índice a medio escribir.
    fn rebuild_index(&self, entries: &[FaqEntry]) -> Result<()> {
        let index: Vec<FaqIndexEntry> = entries
            .iter()
            .map(|e| FaqIndexEntry {
                q: normalize(&e.q),
                a: e.a.clone(),
            })
            .collect();
        let json = serde_json::to_vec_pretty(&index)?;
        atomic_write(&self.index_path, &json)?;
        info!("Índice de FAQs reconstruido con {} entradas.", index.len());
        Ok(())
    }

    /// Busca una respuesta para el mensaje del usuario. La comparación es
    /// por contención simétrica de subcadenas sobre texto normalizado:
    /// una pregunta almacenada coincide si es subcadena del mensaje o el
    /// mensaje es subcadena de la pregunta. Gana la primera coincidencia
    /// en orden de índice.
    ///
    /// Cualquier fallo de E/S o parseo se degrada a `Unavailable`: la
    /// consulta de FAQs nunca tumba una petición de chat.
    pub fn answer(&self, user_message: &str) -> FaqLookup {
        match self.try_answer(user_message) {
            Ok(Some(answer)) => FaqLookup::Hit(answer),
            Ok(None) => FaqLookup::NoMatch,
            Err(err) => {
                warn!("Almacén de FAQs no disponible: {err:#}");
                FaqLookup::Unavailable(format!("{err:#}"))
            }
        }
    }

    fn try_answer(&self, user_message: &str) -> Result<Option<String>> {
        // Reconstrucción perezosa si el índice aún no existe.
        if !self.index_path.exists() {
            let entries = self.load()?;
            self.rebuild_index(&entries)?;
        }

        let raw = fs::read_to_string(&self.index_path)
            .with_context(|| format!("No se pudo leer {}", self.index_path.display()))?;
        let index: Vec<FaqIndexEntry> = serde_json::from_str(&raw)
            .with_context(|| format!("Índice de FAQs corrupto en {}", self.index_path.display()))?;

        let msg = normalize(user_message);
        for item in &index {
            if msg.contains(&item.q) || item.q.contains(&msg) {
                return Ok(Some(item.a.clone()));
            }
        }
        Ok(None)
    }
}

/// Escribe `bytes` en `path` de forma atómica (temporal + rename) creando
/// los directorios intermedios si hace falta.
fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> FaqStore {
        FaqStore::new(dir.join("faqs.yaml"), dir.join("faq_index.json"))
    }

    fn entry(q: &str, a: &str) -> FaqEntry {
        FaqEntry {
            q: q.to_string(),
            a: a.to_string(),
        }
    }

    #[test]
    fn normalize_collapses_and_lowercases() {
        assert_eq!(normalize("  What   ARE the\tOffice hours?  "), "what are the office hours?");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn load_without_file_returns_empty() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn upsert_merges_by_exact_question() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        assert_eq!(store.upsert(&[entry("q1", "a1"), entry("q2", "a2")]).unwrap(), 2);
        // El último upsert gana sobre la misma clave.
        assert_eq!(store.upsert(&[entry("q1", "a1-bis")]).unwrap(), 2);

        let entries = store.load().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].q, "q1");
        assert_eq!(entries[0].a, "a1-bis");
    }

    #[test]
    fn upsert_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let n1 = store.upsert(&[entry("q", "a")]).unwrap();
        let n2 = store.upsert(&[entry("q", "a")]).unwrap();
        assert_eq!(n1, n2);
    }

    #[test]
    fn answer_matches_with_varied_case_and_spacing() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store
            .upsert(&[entry("what are the office hours", "9am-5pm")])
            .unwrap();

        let hit = store.answer("What   are the Office hours?");
        assert_eq!(hit, FaqLookup::Hit("9am-5pm".to_string()));
    }

    #[test]
    fn answer_containment_is_symmetric() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.upsert(&[entry("refund policy", "30 days")]).unwrap();

        // Pregunta almacenada como subcadena del mensaje.
        assert_eq!(
            store.answer("explain the refund policy please"),
            FaqLookup::Hit("30 days".to_string())
        );
        // Mensaje como subcadena de la pregunta almacenada.
        assert_eq!(store.answer("refund"), FaqLookup::Hit("30 days".to_string()));
        // Sin contención en ninguna dirección.
        assert_eq!(store.answer("shipping times"), FaqLookup::NoMatch);
    }

    #[test]
    fn first_index_entry_wins_on_multiple_matches() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store
            .upsert(&[entry("office", "first"), entry("office hours", "second")])
            .unwrap();
        assert_eq!(
            store.answer("office hours"),
            FaqLookup::Hit("first".to_string())
        );
    }

    #[test]
    fn answer_rebuilds_missing_index_lazily() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.upsert(&[entry("horario", "9-5")]).unwrap();
        fs::remove_file(dir.path().join("faq_index.json")).unwrap();

        assert_eq!(store.answer("horario"), FaqLookup::Hit("9-5".to_string()));
        assert!(dir.path().join("faq_index.json").exists());
    }

    #[test]
    fn answer_with_empty_store_is_no_match() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        assert_eq!(store.answer("anything"), FaqLookup::NoMatch);
    }

    #[test]
    fn corrupt_index_reports_unavailable() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.upsert(&[entry("q", "a")]).unwrap();
        fs::write(dir.path().join("faq_index.json"), "{not json").unwrap();

        assert!(matches!(store.answer("q"), FaqLookup::Unavailable(_)));
    }
}
