//! Modelos de dominio y tipos del contrato HTTP del chatbot.

use serde::{Deserialize, Serialize};

/// Una entrada curada de la colección de FAQs (`data/faqs.yaml`).
/// La clave de fusión en los upserts es la pregunta original exacta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqEntry {
    pub q: String,
    pub a: String,
}

/// Metadatos de un chunk indexado, alineados posicionalmente con la
/// fila correspondiente de la matriz de embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub title: String,
    pub path: String,
    pub chunk: String,
}

/// Un chunk recuperado por búsqueda vectorial, con su similitud coseno.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub title: String,
    pub chunk: String,
    pub score: f32,
    pub path: String,
}

/// Estrategia que produjo la respuesta de un chat. Se expone siempre al
/// cliente para que pueda distinguir respuestas con y sin contexto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChatMode {
    Faq,
    Rag,
    Llm,
}

/// Referencia a un chunk citado en una respuesta RAG. La posición *i* en
/// `ChatResponse::sources` corresponde a la cita `[i+1]` del texto.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub title: String,
    pub score: f64,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default = "default_top_k")]
    pub top_k: i64,
    #[serde(default = "default_use_faq_first")]
    pub use_faq_first: bool,
}

fn default_top_k() -> i64 {
    4
}

fn default_use_faq_first() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub sources: Vec<SourceRef>,
    pub mode: ChatMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocAddRequest {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaqUpsertRequest {
    pub items: Vec<FaqEntry>,
}

/// Claims del token de acceso firmado que emite `POST /token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}
