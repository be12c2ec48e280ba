//! Orquestador de respuestas: por cada petición dispara exactamente una de
//! las tres estrategias, en este orden de preferencia:
//!
//!   1. FAQ  — coincidencia en el almacén curado (sin coste de LLM).
//!   2. RAG  — respuesta del LLM restringida al contexto recuperado.
//!   3. LLM  — respuesta libre cuando no hay contexto disponible.
//!
//! El modo elegido se expone siempre en la respuesta para que el cliente
//! distinga respuestas fundamentadas de las que no lo están.

use anyhow::Result;
use tracing::warn;

use crate::app_state::AppState;
use crate::faq::FaqLookup;
use crate::models::{ChatMode, ChatRequest, ChatResponse, RetrievalResult, SourceRef};
use crate::retrieval;

const FALLBACK_SYSTEM_PROMPT: &str =
    "You are a helpful organizational assistant. If you don't know, say so.";

/// Resuelve una petición de chat. Los fallos de infraestructura de FAQ y
/// la ausencia de índice vectorial degradan al siguiente nivel; un fallo
/// del servicio de lenguaje se propaga al caller sin reintentos.
pub async fn chat_answer(state: &AppState, req: &ChatRequest) -> Result<ChatResponse> {
    // 1) Pasada por las FAQs
    if req.use_faq_first {
        match state.faq.answer(&req.message) {
            FaqLookup::Hit(answer) => {
                return Ok(ChatResponse {
                    reply: answer,
                    sources: Vec::new(),
                    mode: ChatMode::Faq,
                });
            }
            FaqLookup::NoMatch => {}
            FaqLookup::Unavailable(reason) => {
                warn!("FAQ no disponible, se continúa con RAG: {reason}");
            }
        }
    }

    // 2) RAG
    let ctx = retrieval::search(
        &state.llm_manager,
        &state.vectors,
        &req.message,
        req.top_k.max(0) as usize,
    )
    .await?;

    if !ctx.is_empty() {
        let context_text = numbered_context(&ctx);
        let reply = state
            .llm_manager
            .answer_with_context(&req.message, &context_text)
            .await?;
        return Ok(ChatResponse {
            reply,
            sources: shape_sources(&ctx),
            mode: ChatMode::Rag,
        });
    }

    // 3) Fallback a LLM sin contexto
    let reply = state
        .llm_manager
        .generate_answer(FALLBACK_SYSTEM_PROMPT, &req.message)
        .await?;
    Ok(ChatResponse {
        reply,
        sources: Vec::new(),
        mode: ChatMode::Llm,
    })
}

/// Concatena los chunks recuperados numerados como `[1]`, `[2]`, … en el
/// mismo orden del ranking. Ese orden es un contrato: la posición *i* de
/// `sources` en la respuesta corresponde a la cita `[i+1]` del texto.
pub fn numbered_context(ctx: &[RetrievalResult]) -> String {
    ctx.iter()
        .enumerate()
        .map(|(i, c)| format!("[{}] {}", i + 1, c.chunk))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Proyecta los resultados del ranking a las fuentes de la respuesta,
/// en el mismo orden, con la similitud redondeada a 3 decimales.
pub fn shape_sources(ctx: &[RetrievalResult]) -> Vec<SourceRef> {
    ctx.iter()
        .map(|c| SourceRef {
            title: c.title.clone(),
            score: (f64::from(c.score) * 1000.0).round() / 1000.0,
            path: c.path.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use tempfile::tempdir;

    use crate::app_state::Status;
    use crate::config::{AppConfig, LlmProvider};
    use crate::faq::FaqStore;
    use crate::llm::LlmManager;
    use crate::models::FaqEntry;
    use crate::vector_store::VectorStore;

    fn result(title: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            title: title.to_string(),
            chunk: format!("contenido de {title}"),
            score,
            path: format!("data/docs/{title}.txt"),
        }
    }

    fn state_in(dir: &Path) -> AppState {
        let config = AppConfig {
            server_addr: "127.0.0.1:0".into(),
            llm_provider: LlmProvider::OpenAI,
            llm_embedding_model: "text-embedding-3-small".into(),
            llm_chat_model: "gpt-4o-mini".into(),
            faq_path: dir.join("faqs.yaml"),
            docs_dir: dir.join("docs"),
            storage_dir: dir.join("storage"),
            admin_api_keys: Vec::new(),
            token_secret: "secreto".into(),
            token_ttl_seconds: 3600,
        };
        let llm_manager = LlmManager::from_config(&config).unwrap();
        let faq = Arc::new(FaqStore::new(
            config.faq_path.clone(),
            config.storage_dir.join("faq_index.json"),
        ));
        let vectors = Arc::new(VectorStore::new(config.storage_dir.clone()));
        AppState {
            config,
            llm_manager,
            faq,
            vectors,
            status: Arc::new(Mutex::new(Status::default())),
        }
    }

    #[test]
    fn numbered_context_matches_source_positions() {
        let ctx = vec![result("alpha", 0.9), result("beta", 0.5)];
        let text = numbered_context(&ctx);
        let sources = shape_sources(&ctx);

        assert!(text.starts_with("[1] contenido de alpha"));
        assert!(text.contains("[2] contenido de beta"));
        assert_eq!(sources[0].title, "alpha");
        assert_eq!(sources[1].title, "beta");
    }

    #[test]
    fn shape_sources_rounds_to_three_decimals() {
        let sources = shape_sources(&[result("doc", 0.123_456)]);
        assert_eq!(sources[0].score, 0.123);
        let sources = shape_sources(&[result("doc", 0.999_9)]);
        assert_eq!(sources[0].score, 1.0);
    }

    #[tokio::test]
    async fn faq_hit_short_circuits_before_any_llm_call() {
        let dir = tempdir().unwrap();
        let state = state_in(dir.path());
        state
            .faq
            .upsert(&[FaqEntry {
                q: "what are the office hours".into(),
                a: "9am-5pm".into(),
            }])
            .unwrap();

        let req = ChatRequest {
            message: "What are the office hours?".into(),
            top_k: 4,
            use_faq_first: true,
        };
        // Con hit de FAQ no se toca ni el índice vectorial ni el LLM,
        // así que la llamada resuelve sin servicios externos.
        let resp = chat_answer(&state, &req).await.unwrap();
        assert_eq!(resp.mode, ChatMode::Faq);
        assert_eq!(resp.reply, "9am-5pm");
        assert!(resp.sources.is_empty());
    }
}
