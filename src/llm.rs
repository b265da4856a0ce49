//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM
//! (OpenAI y Gemini). Las claves se leen del entorno (`OPENAI_API_KEY`,
//! `GEMINI_API_KEY`).

use crate::config::{AppConfig, LlmProvider};
use anyhow::{anyhow, Context, Result};
use rig::completion::Prompt;
use tracing::warn;

/// Diagrama por defecto cuando el modelo no devuelve nada aprovechable.
pub const DEFAULT_DIAGRAM: &str = "graph TD\nA[App] --> B[Arquitectura por defecto]";

/// Gestor de LLMs.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub chat_model: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            provider: cfg.llm_provider,
            chat_model: cfg.llm_chat_model.clone(),
        }
    }

    fn model_name(&self) -> &str {
        if self.chat_model.is_empty() {
            self.provider.default_chat_model()
        } else {
            self.chat_model.as_str()
        }
    }

    // ---------------------------------------------------------------------
    // CHAT / COMPLETION
    // ---------------------------------------------------------------------

    /// Envía `prompt` al modelo configurado y devuelve el texto generado.
    pub async fn complete(&self, preamble: &str, prompt: &str, temperature: Option<f64>) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAI => self.complete_with_openai(preamble, prompt, temperature).await,
            LlmProvider::Gemini => self.complete_with_gemini(preamble, prompt, temperature).await,
        }
    }

    async fn complete_with_openai(
        &self,
        preamble: &str,
        prompt: &str,
        temperature: Option<f64>,
    ) -> Result<String> {
        use rig::providers::openai;
        use rig::client::CompletionClient as _;

        let key = api_key("OPENAI_API_KEY")?;
        let client = openai::Client::new(&key);
        let mut builder = client.agent(self.model_name()).preamble(preamble);
        if let Some(t) = temperature {
            builder = builder.temperature(t);
        }

        let answer = builder.build().prompt(prompt).await?;
        Ok(answer)
    }

    async fn complete_with_gemini(
        &self,
        preamble: &str,
        prompt: &str,
        temperature: Option<f64>,
    ) -> Result<String> {
        use rig::providers::gemini;
        use rig::client::CompletionClient as _;

        let key = api_key("GEMINI_API_KEY")?;
        let client = gemini::Client::new(&key);
        let mut builder = client.agent(self.model_name()).preamble(preamble);
        if let Some(t) = temperature {
            builder = builder.temperature(t);
        }

        let answer = builder.build().prompt(prompt).await?;
        Ok(answer)
    }

    // ---------------------------------------------------------------------
    // DIAGRAMA DE ARQUITECTURA
    // ---------------------------------------------------------------------

    /// Pide al modelo un diagrama Mermaid (`graph TD`) de la arquitectura.
    /// Nunca falla: ante error o respuesta vacía devuelve `DEFAULT_DIAGRAM`.
    pub async fn architecture_diagram(&self, project_context: &str) -> String {
        const DIAGRAM_PROMPT: &str = r#"
Based on the project context you receive, generate a Mermaid.js flowchart (graph TD) representing the core system architecture.
Return ONLY the mermaid code, no extra text.
"#;

        diagram_or_default(
            self.complete(DIAGRAM_PROMPT, &format!("CONTEXT: {project_context}"), None)
                .await,
        )
    }
}

/// Lee la clave del proveedor. Sin clave la llamada falla con `Err`,
/// nunca con pánico.
fn api_key(var: &str) -> Result<String> {
    let key = std::env::var(var).with_context(|| format!("Falta {var} en el entorno"))?;
    if key.trim().is_empty() {
        return Err(anyhow!("{var} está vacía"));
    }
    Ok(key)
}

fn diagram_or_default(result: Result<String>) -> String {
    match result {
        Ok(raw) => clean_mermaid(&raw),
        Err(e) => {
            warn!("No se pudo generar el diagrama de arquitectura: {e}");
            DEFAULT_DIAGRAM.to_string()
        }
    }
}

/// Quita las vallas de bloque de código que suelen envolver la respuesta.
pub fn clean_mermaid(raw: &str) -> String {
    let cleaned = raw.replace("```mermaid", "").replace("```", "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        DEFAULT_DIAGRAM.to_string()
    } else {
        cleaned.to_string()
    }
}
