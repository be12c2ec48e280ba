//! Capa HTTP: rutas y handlers de la API del chatbot. La lógica de negocio
//! vive en `chat`, `faq`, `ingest` y `retrieval`; aquí sólo se validan
//! entradas, se comprueban credenciales y se da forma a las respuestas.

use axum::{
    extract::{Json, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::spawn;
use tracing::{error, info};

use crate::{
    app_state::AppState,
    auth::{self, AuthError},
    chat,
    faq::FaqLookup,
    ingest,
    models::{ChatRequest, ChatResponse, DocAddRequest, FaqUpsertRequest},
};

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

fn auth_failure(err: AuthError) -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, err.to_string())
}

// --- Payloads propios de la capa HTTP ---

#[derive(Deserialize)]
pub struct TokenParams {
    user: String,
    #[serde(default = "default_role")]
    role: String,
}

fn default_role() -> String {
    "user".to_string()
}

#[derive(Deserialize)]
pub struct FaqAskParams {
    q: String,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/token", post(token_handler))
        .route("/chat", post(chat_handler))
        .route("/faq", get(list_faqs_handler))
        .route("/faq/ask", get(faq_ask_handler))
        .route("/faq/upsert", post(faq_upsert_handler))
        .route("/docs/add", post(doc_add_handler))
        .route("/ingest", post(ingest_handler))
        .route("/status", get(status_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[axum::debug_handler]
async fn token_handler(
    State(state): State<AppState>,
    Query(params): Query<TokenParams>,
) -> Json<serde_json::Value> {
    let token = auth::create_token(
        &state.config.token_secret,
        &params.user,
        &params.role,
        state.config.token_ttl_seconds,
    );
    Json(json!({ "access_token": token, "token_type": "bearer" }))
}

#[axum::debug_handler]
async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    auth::bearer_claims(&state.config, &headers).map_err(auth_failure)?;

    // Entradas inválidas se rechazan antes de tocar la recuperación.
    if payload.message.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "El mensaje no puede estar vacío.",
        ));
    }
    if payload.top_k < 1 {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "top_k debe ser mayor o igual que 1.",
        ));
    }

    match chat::chat_answer(&state, &payload).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            error!("Error resolviendo la petición de chat: {e:#}");
            Err(api_error(
                StatusCode::BAD_GATEWAY,
                "El servicio de lenguaje no pudo completar la respuesta.",
            ))
        }
    }
}

#[axum::debug_handler]
async fn list_faqs_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.faq.load() {
        Ok(entries) => Ok(Json(json!(entries))),
        Err(e) => {
            error!("Error cargando las FAQs: {e:#}");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "No se pudo cargar la colección de FAQs.",
            ))
        }
    }
}

#[axum::debug_handler]
async fn faq_ask_handler(
    State(state): State<AppState>,
    Query(params): Query<FaqAskParams>,
) -> Json<serde_json::Value> {
    let answer = match state.faq.answer(&params.q) {
        FaqLookup::Hit(a) => Some(a),
        FaqLookup::NoMatch | FaqLookup::Unavailable(_) => None,
    };
    Json(json!({ "answer": answer }))
}

#[axum::debug_handler]
async fn faq_upsert_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<FaqUpsertRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    auth::require_admin_key(&state.config, &headers).map_err(auth_failure)?;

    match state.faq.upsert(&payload.items) {
        Ok(total) => Ok(Json(json!({ "updated_count": total }))),
        Err(e) => {
            error!("Error en el upsert de FAQs: {e:#}");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "No se pudo actualizar la colección de FAQs.",
            ))
        }
    }
}

/// Guarda un documento de texto en la raíz de documentos. No se reindexa
/// de forma síncrona: el documento entra en el índice en la siguiente
/// ingesta, y esa ventana de desfase es comportamiento documentado.
#[axum::debug_handler]
async fn doc_add_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<DocAddRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    auth::require_admin_key(&state.config, &headers).map_err(auth_failure)?;

    if payload.title.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "El título no puede estar vacío.",
        ));
    }

    let fname = format!("{}_{}.txt", Utc::now().timestamp(), sanitize_title(&payload.title));
    let target = state.config.docs_dir.join(&fname);

    let write_result = std::fs::create_dir_all(&state.config.docs_dir)
        .and_then(|()| std::fs::write(&target, payload.text.as_bytes()));
    match write_result {
        Ok(()) => Ok(Json(json!({
            "saved": fname,
            "message": "Ejecuta POST /ingest para reindexar."
        }))),
        Err(e) => {
            error!("Error guardando el documento {}: {e}", target.display());
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "No se pudo guardar el documento.",
            ))
        }
    }
}

#[axum::debug_handler]
async fn ingest_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    auth::require_admin_key(&state.config, &headers).map_err(auth_failure)?;

    if state.status.lock().unwrap().is_busy {
        return Err(api_error(
            StatusCode::CONFLICT,
            "Ya hay una ingesta en curso.",
        ));
    }

    let docs_dir = state.config.docs_dir.clone();
    spawn(async move {
        {
            let mut status = state.status.lock().unwrap();
            status.is_busy = true;
            status.message = "Iniciando indexación...".to_string();
            status.progress = 0.0;
        }

        let result = ingest::ingest_documents(
            &state.llm_manager,
            &state.vectors,
            &docs_dir,
            state.status.clone(),
        )
        .await;

        let mut status = state.status.lock().unwrap();
        status.is_busy = false;
        status.progress = 0.0;
        match result {
            Ok(summary) => {
                status.message = format!("¡Indexación completada! {}", summary);
                info!("{summary}");
            }
            Err(err) => {
                status.message = format!("Error en la indexación: {}", err);
                error!("Error de ingesta: {err:#}");
            }
        }
    });

    Ok(StatusCode::ACCEPTED)
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<crate::app_state::Status> {
    Json(state.status.lock().unwrap().clone())
}

/// Reduce un título a un nombre de fichero plano: alfanuméricos, guiones y
/// guiones bajos; todo lo demás (separadores de ruta incluidos) pasa a `_`,
/// de modo que el fichero no puede salirse de la raíz de documentos.
fn sanitize_title(title: &str) -> String {
    title
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
