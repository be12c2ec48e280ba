//! Índice vectorial persistido en disco como dos artefactos alineados:
//!
//!   - `vector_index.bin`: matriz row-major de f32 little-endian, una fila
//!     (normalizada a L2) por chunk.
//!   - `vector_meta.json`: identificador del modelo de embeddings, dimensión
//!     y metadatos `{title, path, chunk}` en el mismo orden que las filas.
//!
//! El índice se reemplaza completo en cada ingesta (temporal + rename por
//! artefacto, metadatos al final) y es de sólo lectura en consulta.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::models::ChunkMeta;

pub const INDEX_FILE: &str = "vector_index.bin";
pub const META_FILE: &str = "vector_meta.json";

/// Fallos al cargar o reemplazar el índice. Un artefacto corrupto o un
/// cambio de modelo de embeddings deben fallar de forma ruidosa: devolver
/// resultados con un espacio de embeddings incompatible corrompería el
/// ranking en silencio. La recuperación en ambos casos es re-ingerir.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("artefacto del índice vectorial corrupto: {0}")]
    Corrupt(String),
    #[error(
        "el índice fue generado con el modelo de embeddings '{found}' pero la configuración actual usa '{expected}'; re-ingiere los documentos"
    )]
    ModelMismatch { found: String, expected: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Índice vectorial en memoria: matriz aplanada + metadatos alineados.
/// Invariante: `matrix.len() == items.len() * dim`.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    pub model: String,
    pub dim: usize,
    pub matrix: Vec<f32>,
    pub items: Vec<ChunkMeta>,
}

impl VectorIndex {
    /// Fila `i` de la matriz, alineada con `items[i]`.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.matrix[i * self.dim..(i + 1) * self.dim]
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexManifest {
    model: String,
    dim: usize,
    items: Vec<ChunkMeta>,
}

/// Repositorio del índice vectorial sobre un directorio de almacenamiento.
/// La interfaz es carga / reemplazo atómico, de modo que el backend podría
/// cambiarse sin tocar la lógica de orquestación.
pub struct VectorStore {
    dir: PathBuf,
}

impl VectorStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }

    /// Carga el índice persistido. `Ok(None)` si aún no se ha ingerido nada
    /// (ausencia no es un error: habilita el fallback del orquestador).
    /// Verifica que el modelo registrado coincide con `expected_model` y que
    /// la matriz y los metadatos siguen alineados.
    pub fn load(&self, expected_model: &str) -> Result<Option<VectorIndex>, IndexError> {
        let index_path = self.index_path();
        let meta_path = self.meta_path();
        if !index_path.exists() || !meta_path.exists() {
            return Ok(None);
        }

        let raw_meta = fs::read_to_string(&meta_path)?;
        let manifest: IndexManifest = serde_json::from_str(&raw_meta)
            .map_err(|e| IndexError::Corrupt(format!("{}: {e}", meta_path.display())))?;

        if manifest.model != expected_model {
            return Err(IndexError::ModelMismatch {
                found: manifest.model,
                expected: expected_model.to_string(),
            });
        }

        let bytes = fs::read(&index_path)?;
        let expected_len = manifest
            .items
            .len()
            .checked_mul(manifest.dim)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| IndexError::Corrupt("dimensiones del manifiesto desbordan".into()))?;
        if bytes.len() != expected_len {
            return Err(IndexError::Corrupt(format!(
                "{}: se esperaban {} bytes ({} filas x {} dims) pero hay {}",
                index_path.display(),
                expected_len,
                manifest.items.len(),
                manifest.dim,
                bytes.len()
            )));
        }

        let matrix: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Some(VectorIndex {
            model: manifest.model,
            dim: manifest.dim,
            matrix,
            items: manifest.items,
        }))
    }

    /// Reemplaza el índice completo. Cada artefacto se escribe en una ruta
    /// temporal y se renombra; los metadatos se escriben en último lugar
    /// para que un corte a mitad deje una discrepancia detectable en la
    /// siguiente carga en vez de una corrupción silenciosa.
    pub fn replace(&self, index: &VectorIndex) -> Result<(), IndexError> {
        debug_assert_eq!(index.matrix.len(), index.items.len() * index.dim);
        fs::create_dir_all(&self.dir)?;

        let mut bytes = Vec::with_capacity(index.matrix.len() * 4);
        for value in &index.matrix {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        atomic_write(&self.index_path(), &bytes)?;

        let manifest = IndexManifest {
            model: index.model.clone(),
            dim: index.dim,
            items: index.items.clone(),
        };
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| IndexError::Corrupt(e.to_string()))?;
        atomic_write(&self.meta_path(), &json)?;

        info!(
            "Índice vectorial reemplazado: {} chunks, dimensión {}.",
            index.items.len(),
            index.dim
        );
        Ok(())
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
