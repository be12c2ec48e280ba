//! Carga y gestión de configuración de la aplicación (rutas de datos,
//! servidor HTTP, LLM y credenciales de administración).

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

#[derive(Clone, Debug)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,

    pub llm_provider: LlmProvider,
    pub llm_embedding_model: String,
    pub llm_chat_model: String,

    /// Fichero YAML fuente de verdad de las FAQs.
    pub faq_path: PathBuf,
    /// Raíz de los documentos a ingerir (txt / md / pdf).
    pub docs_dir: PathBuf,
    /// Directorio donde se persisten los artefactos derivados
    /// (índice de FAQs e índice vectorial).
    pub storage_dir: PathBuf,

    pub admin_api_keys: Vec<String>,
    pub token_secret: String,
    pub token_ttl_seconds: i64,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8000".to_string());

        let llm_provider_str =
            env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;

        let llm_embedding_model = env::var("LLM_EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());
        let llm_chat_model =
            env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let faq_path =
            PathBuf::from(env::var("FAQ_PATH").unwrap_or_else(|_| "data/faqs.yaml".to_string()));
        let docs_dir =
            PathBuf::from(env::var("DOCS_DIR").unwrap_or_else(|_| "data/docs".to_string()));
        let storage_dir =
            PathBuf::from(env::var("STORAGE_DIR").unwrap_or_else(|_| "storage".to_string()));

        let admin_api_keys = env::var("ADMIN_API_KEYS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();

        let token_secret =
            env::var("TOKEN_SECRET").unwrap_or_else(|_| "change_me".to_string());
        let token_ttl_seconds = env::var("TOKEN_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3600);

        Ok(Self {
            server_addr,
            llm_provider,
            llm_embedding_model,
            llm_chat_model,
            faq_path,
            docs_dir,
            storage_dir,
            admin_api_keys,
            token_secret,
            token_ttl_seconds,
        })
    }
}
