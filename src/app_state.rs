use std::sync::{Arc, Mutex};

use crate::config::AppConfig;
use crate::faq::FaqStore;
use crate::llm::LlmManager;
use crate::vector_store::VectorStore;

/// Estado compartido entre todas las peticiones. Los almacenes son de
/// lectura compartida; la ingesta en segundo plano publica su avance a
/// través de `status`.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub llm_manager: LlmManager,
    pub faq: Arc<FaqStore>,
    pub vectors: Arc<VectorStore>,
    pub status: Arc<Mutex<Status>>,
}

/// Progreso de la ingesta en segundo plano, consultable vía `GET /status`.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}
