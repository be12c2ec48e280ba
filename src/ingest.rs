//! Ingesta de un directorio de documentos (txt / md / pdf): troceado en
//! ventanas solapadas, limpieza ligera para el embedding y reemplazo
//! completo del índice vectorial persistido.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{anyhow, Result};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::app_state::Status;
use crate::llm::LlmManager;
use crate::models::ChunkMeta;
use crate::vector_store::{VectorIndex, VectorStore};

/// Tamaño de ventana y solape del troceado, en caracteres.
/// Invariante: el solape es menor que la ventana, lo que garantiza avance
/// entre ventanas consecutivas.
pub const CHUNK_SIZE: usize = 800;
pub const CHUNK_OVERLAP: usize = 120;

/// Palabras vacías que se eliminan del texto antes de calcular el embedding.
/// El chunk almacenado conserva la redacción original para mostrar y citar;
/// sólo la entrada del modelo se limpia.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "all", "also", "am", "an", "and", "any", "are", "as",
    "at", "be", "because", "been", "before", "being", "below", "between", "both", "but", "by",
    "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "him", "his", "how",
    "i", "if", "in", "into", "is", "it", "its", "just", "me", "more", "most", "my", "no", "nor",
    "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "out", "over", "own",
    "same", "she", "should", "so", "some", "such", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "would", "you", "your",
];

fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Default)]
pub struct IngestionSummary {
    pub files_scanned: u32,
    pub files_indexed: u32,
    pub files_skipped: u32,
    pub chunks_indexed: usize,
}

impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} ficheros escaneados, {} indexados, {} omitidos. {} chunks en el índice.",
            self.files_scanned, self.files_indexed, self.files_skipped, self.chunks_indexed
        )
    }
}

/// Recorre recursivamente `root`, trocea cada documento soportado y
/// reemplaza por completo el índice vectorial con los nuevos embeddings.
///
/// Si no se produce ningún chunk (directorio vacío o documentos sin texto),
/// la ingesta es un no-op que reporta cero chunks: un índice previo se deja
/// intacto en vez de borrarlo. El reemplazo total (nunca incremental) es el
/// comportamiento configurado de este sistema.
pub async fn ingest_documents(
    llm: &LlmManager,
    store: &VectorStore,
    root: &Path,
    status_arc: Arc<Mutex<Status>>,
) -> Result<IngestionSummary> {
    // Una raíz todavía inexistente (despliegue recién estrenado, sin
    // documentos dados de alta) cuenta como "cero documentos", no como
    // error; sólo una ruta que existe y no es un directorio es inválida.
    if !root.exists() {
        info!("La raíz de documentos {} no existe aún: ingesta sin chunks.", root.display());
        return Ok(IngestionSummary::default());
    }
    if !root.is_dir() {
        return Err(anyhow!("La ruta no es un directorio: {}", root.display()));
    }

    let (mut summary, metas, embed_inputs) = collect_document_chunks(root, &status_arc)?;

    if metas.is_empty() {
        info!("Ingesta sin chunks: se conserva el índice previo si existía.");
        return Ok(summary);
    }

    {
        let mut status = status_arc.lock().unwrap();
        status.message = format!("Calculando embeddings de {} chunks...", metas.len());
    }

    let vectors = llm.embed_texts(&embed_inputs).await?;
    let dim = vectors
        .first()
        .map(Vec::len)
        .ok_or_else(|| anyhow!("El servicio de embeddings no devolvió vectores"))?;
    if vectors.iter().any(|v| v.len() != dim) {
        return Err(anyhow!("Embeddings con dimensiones inconsistentes"));
    }

    let mut matrix = Vec::with_capacity(metas.len() * dim);
    for v in &vectors {
        matrix.extend_from_slice(v);
    }

    store.replace(&VectorIndex {
        model: llm.embedding_model.clone(),
        dim,
        matrix,
        items: metas,
    })?;

    summary.chunks_indexed = embed_inputs.len();
    info!("{summary}");
    Ok(summary)
}

/// Fase de lectura y troceado, sin llamadas externas: devuelve los metadatos
/// de cada chunk (texto original) junto con el texto limpio que se usará
/// como entrada del embedding, en el mismo orden.
fn collect_document_chunks(
    root: &Path,
    status_arc: &Arc<Mutex<Status>>,
) -> Result<(IngestionSummary, Vec<ChunkMeta>, Vec<String>)> {
    let mut summary = IngestionSummary::default();
    let mut metas = Vec::new();
    let mut embed_inputs = Vec::new();

    let file_entries: Vec<_> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .collect();
    let total_files = file_entries.len();

    for (index, entry) in file_entries.iter().enumerate() {
        summary.files_scanned += 1;
        let path = entry.path();
        let filename = path.file_name().unwrap_or_default().to_string_lossy();

        {
            let mut status = status_arc.lock().unwrap();
            status.message =
                format!("[{}/{}] Procesando: {}...", index + 1, total_files, filename);
            status.progress = (index + 1) as f32 / total_files as f32;
        }

        let Some(text) = extract_file_text(path) else {
            summary.files_skipped += 1;
            continue;
        };

        let text = normalize_whitespace(&text);
        if text.is_empty() {
            warn!("Fichero vacío o sin texto útil: {}", path.display());
            summary.files_skipped += 1;
            continue;
        }

        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| filename.to_string());
        let path_str = path.to_string_lossy().to_string();

        for chunk in chunk_text(&text, CHUNK_SIZE, CHUNK_OVERLAP) {
            embed_inputs.push(clean_for_embedding(&chunk));
            metas.push(ChunkMeta {
                title: title.clone(),
                path: path_str.clone(),
                chunk,
            });
        }
        summary.files_indexed += 1;
    }

    Ok((summary, metas, embed_inputs))
}

/// Extrae el texto bruto de un fichero soportado; `None` si la extensión no
/// está soportada o la extracción falla (el fichero se omite, no se aborta
/// la ingesta).
fn extract_file_text(path: &Path) -> Option<String> {
    let extension = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "pdf" => match pdf_extract::extract_text(path) {
            Ok(content) => Some(content),
            Err(e) => {
                warn!("No se pudo extraer texto del PDF {}: {}. Saltando fichero.", path.display(), e);
                None
            }
        },
        "txt" | "md" => match fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(_) => {
                warn!("Saltando fichero no-texto o no-UTF8: {}", path.display());
                None
            }
        },
        _ => {
            info!("Saltando fichero con extensión no soportada ('.{}'): {}", extension, path.display());
            None
        }
    }
}

/// Colapsa cualquier secuencia de espacios en blanco a un único espacio.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trocea `text` en ventanas de `size` caracteres con `overlap` caracteres
/// de solape entre ventanas consecutivas. El troceado es por caracteres
/// (no bytes) para no partir secuencias UTF-8.
///
/// Para un texto de longitud L produce `ceil((L - overlap) / (size - overlap))`
/// chunks; un texto que cabe en una ventana produce exactamente uno.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    assert!(overlap < size, "el solape debe ser menor que la ventana");

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let step = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Elimina palabras vacías del chunk para mejorar la calidad del embedding.
/// Si la limpieza vaciara el texto por completo se conserva el original:
/// el servicio de embeddings rechaza entradas vacías.
pub fn clean_for_embedding(chunk: &str) -> String {
    let cleaned = chunk
        .split_whitespace()
        .filter(|w| !stop_words().contains(w.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ");
    if cleaned.is_empty() {
        chunk.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn silent_status() -> Arc<Mutex<Status>> {
        Arc::new(Mutex::new(Status::default()))
    }

    #[test]
    fn chunk_count_follows_window_formula() {
        // ceil((L - O) / (W - O)) con W=800, O=120.
        let cases = [(100usize, 1usize), (800, 1), (801, 2), (1000, 2), (1481, 3)];
        for (len, expected) in cases {
            let text = "x".repeat(len);
            assert_eq!(
                chunk_text(&text, CHUNK_SIZE, CHUNK_OVERLAP).len(),
                expected,
                "longitud {len}"
            );
        }
    }

    #[test]
    fn consecutive_chunks_share_the_overlap() {
        let text: String = ('a'..='z').cycle().take(2000).collect();
        let chunks = chunk_text(&text, CHUNK_SIZE, CHUNK_OVERLAP);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().skip(pair[0].chars().count() - CHUNK_OVERLAP).collect();
            let head: String = pair[1].chars().take(CHUNK_OVERLAP).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn chunking_counts_characters_not_bytes() {
        let text = "ñ".repeat(900);
        let chunks = chunk_text(&text, CHUNK_SIZE, CHUNK_OVERLAP);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), CHUNK_SIZE);
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        assert!(chunk_text("", CHUNK_SIZE, CHUNK_OVERLAP).is_empty());
    }

    #[test]
    fn normalize_whitespace_collapses_runs() {
        assert_eq!(normalize_whitespace("a\n\n b\t\tc  "), "a b c");
    }

    #[test]
    fn clean_for_embedding_strips_stop_words() {
        assert_eq!(
            clean_for_embedding("the refund policy is in the handbook"),
            "refund policy handbook"
        );
    }

    #[test]
    fn clean_for_embedding_keeps_original_when_all_stop_words() {
        assert_eq!(clean_for_embedding("the and of"), "the and of");
    }

    #[test]
    fn collect_filters_extensions_and_empty_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("guide.txt"), "refund policy lasts thirty days").unwrap();
        fs::write(dir.path().join("notes.md"), "# Horario\noficina de 9 a 5").unwrap();
        fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();
        fs::write(dir.path().join("empty.txt"), "   \n  ").unwrap();

        let (summary, metas, inputs) =
            collect_document_chunks(dir.path(), &silent_status()).unwrap();

        assert_eq!(summary.files_scanned, 4);
        assert_eq!(summary.files_indexed, 2);
        assert_eq!(summary.files_skipped, 2);
        assert_eq!(metas.len(), 2);
        assert_eq!(metas.len(), inputs.len());
        assert!(metas.iter().any(|m| m.title == "guide"));
        // El chunk almacenado conserva la redacción original.
        assert!(metas
            .iter()
            .any(|m| m.chunk.contains("lasts thirty days")));
    }

    #[tokio::test]
    async fn missing_docs_root_is_a_zero_chunk_noop() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("docs-nunca-creada");
        let cfg = crate::config::AppConfig::from_env().unwrap();
        let llm = LlmManager::from_config(&cfg).unwrap();
        let store = VectorStore::new(dir.path().join("storage"));

        // Sin raíz no hay chunks, así que se resuelve sin servicios externos.
        let summary = ingest_documents(&llm, &store, &root, silent_status())
            .await
            .unwrap();
        assert_eq!(summary.files_scanned, 0);
        assert_eq!(summary.chunks_indexed, 0);
    }

    #[tokio::test]
    async fn file_as_docs_root_is_rejected() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("no-un-directorio.txt");
        fs::write(&root, "texto").unwrap();
        let cfg = crate::config::AppConfig::from_env().unwrap();
        let llm = LlmManager::from_config(&cfg).unwrap();
        let store = VectorStore::new(dir.path().join("storage"));

        assert!(ingest_documents(&llm, &store, &root, silent_status())
            .await
            .is_err());
    }

    #[test]
    fn collect_on_empty_dir_yields_nothing() {
        let dir = tempdir().unwrap();
        let (summary, metas, _) = collect_document_chunks(dir.path(), &silent_status()).unwrap();
        assert_eq!(summary.files_scanned, 0);
        assert!(metas.is_empty());
    }
}
