//! Búsqueda vectorial sobre el índice persistido: embedding de la consulta
//! con el mismo modelo de la ingesta y ranking exacto por similitud coseno
//! (fuerza bruta sobre todas las filas).
//!
//! A la escala objetivo (miles de chunks) el coste O(N·d) por consulta es
//! aceptable; un corpus de decenas de miles de chunks necesitaría búsqueda
//! aproximada, que queda fuera del alcance actual.

use std::cmp::Ordering;

use anyhow::{anyhow, Result};

use crate::llm::LlmManager;
use crate::models::RetrievalResult;
use crate::vector_store::{VectorIndex, VectorStore};

/// Devuelve los `top_k` chunks más similares a `query`, de mayor a menor
/// similitud. Sin índice persistido devuelve una lista vacía (no es un
/// error: habilita el fallback a LLM). Un índice corrupto o generado con
/// otro modelo de embeddings sí falla, de forma ruidosa.
pub async fn search(
    llm: &LlmManager,
    store: &VectorStore,
    query: &str,
    top_k: usize,
) -> Result<Vec<RetrievalResult>> {
    if top_k == 0 {
        return Ok(Vec::new());
    }

    let Some(index) = store.load(&llm.embedding_model)? else {
        return Ok(Vec::new());
    };
    if index.items.is_empty() {
        return Ok(Vec::new());
    }

    let query_vectors = llm.embed_texts(&[query.to_string()]).await?;
    let query_vec = query_vectors
        .first()
        .ok_or_else(|| anyhow!("No se pudo generar el embedding de la consulta"))?;
    if query_vec.len() != index.dim {
        return Err(anyhow!(
            "Dimensión del embedding de consulta ({}) distinta a la del índice ({})",
            query_vec.len(),
            index.dim
        ));
    }

    Ok(rank(query_vec, &index, top_k))
}

/// Ranking puro: similitud coseno (producto escalar entre vectores ya
/// normalizados) contra cada fila, orden descendente estable (los empates
/// conservan el orden original del índice) y truncado a `top_k`.
pub fn rank(query_vec: &[f32], index: &VectorIndex, top_k: usize) -> Vec<RetrievalResult> {
    let mut scored: Vec<(usize, f32)> = (0..index.items.len())
        .map(|i| (i, dot(query_vec, index.row(i))))
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(top_k);

    scored
        .into_iter()
        .map(|(i, score)| {
            let meta = &index.items[i];
            RetrievalResult {
                title: meta.title.clone(),
                chunk: meta.chunk.clone(),
                score,
                path: meta.path.clone(),
            }
        })
        .collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
