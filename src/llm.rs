//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM.
//! De momento se implementa OpenAI; Gemini/Ollama quedan preparados para el futuro.

use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel; // <- para .embed_texts

use crate::config::{AppConfig, LlmProvider};

/// Cliente OpenAI compartido por todas las peticiones concurrentes.
/// La inicialización pasa por una puerta de un solo uso para que varias
/// peticiones en frío no construyan cada una su propio cliente.
static OPENAI_CLIENT: OnceLock<rig::providers::openai::Client> = OnceLock::new();

fn openai_client() -> &'static rig::providers::openai::Client {
    OPENAI_CLIENT.get_or_init(rig::providers::openai::Client::from_env)
}

/// Normaliza un vector a norma L2 unitaria. Los vectores del índice y los
/// de consulta pasan por aquí, de modo que el producto escalar entre ambos
/// es directamente la similitud coseno.
fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Gestor de LLMs y embeddings.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub embedding_model: String,
    pub chat_model: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
        })
    }

    // ---------------------------------------------------------------------
    // EMBEDDINGS
    // ---------------------------------------------------------------------

    /// Calcula embeddings normalizados (norma L2 = 1) para una lista de textos.
    /// Se usa el mismo modelo tanto en la ingesta como en las consultas;
    /// mezclar modelos corrompería el ranking en silencio.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self.provider {
            LlmProvider::OpenAI => self.embed_with_openai(texts).await,
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para embeddings",
                other
            )),
        }
    }

    async fn embed_with_openai(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        use rig::client::EmbeddingsClient as _;
        use rig::providers::openai::TEXT_EMBEDDING_3_SMALL;

        let client = openai_client();

        // Modelo de embeddings: config o default
        let model_name = if self.embedding_model.is_empty() {
            TEXT_EMBEDDING_3_SMALL
        } else {
            self.embedding_model.as_str()
        };

        let embedding_model = client.embedding_model(model_name);
        let embeddings = embedding_model.embed_texts(texts.to_vec()).await?;

        if embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                embeddings.len(),
                texts.len()
            ));
        }

        let mut vectors = Vec::with_capacity(embeddings.len());
        for emb in &embeddings {
            let mut v: Vec<f32> = emb.vec.iter().map(|x| *x as f32).collect();
            l2_normalize(&mut v);
            vectors.push(v);
        }

        Ok(vectors)
    }

    // ---------------------------------------------------------------------
    // CHAT / COMPLETION
    // ---------------------------------------------------------------------

    /// Genera una respuesta libre a partir de un prompt de sistema y el
    /// mensaje del usuario. Un fallo aquí se propaga al caller: cambia el
    /// modo de respuesta que recibe el usuario y no debe ocultarse.
    pub async fn generate_answer(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAI => self.complete_with_openai(system_prompt, user_prompt).await,
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para chat",
                other
            )),
        }
    }

    /// Genera una respuesta restringida al contexto recuperado. El contexto
    /// llega ya numerado como `[1]`, `[2]`, … en el mismo orden que las
    /// fuentes devueltas al cliente.
    pub async fn answer_with_context(&self, question: &str, context: &str) -> Result<String> {
        const SYSTEM_PROMPT: &str = "You are a concise, accurate organizational assistant. \
             Use the provided CONTEXT strictly. If uncertain, say you don't know.";

        let user_prompt = format!(
            "CONTEXT:\n{context}\n\nQUESTION:\n{question}\n\nFormat: brief answer then list sources as [1], [2] as needed."
        );

        self.generate_answer(SYSTEM_PROMPT, &user_prompt).await
    }

    async fn complete_with_openai(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String> {
        use rig::client::CompletionClient as _;

        let client = openai_client();

        // Modelo de chat por defecto si no se ha configurado otro
        let model_name = if self.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.chat_model.as_str()
        };

        let agent = client.agent(model_name).preamble(system_prompt).build();

        let answer = agent.prompt(user_prompt).await?;
        Ok(answer.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_leaves_zero_vector_untouched() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }
}
