//! Carga y gestión de configuración de la aplicación (LLM + GitHub + datos).

use std::env;
use std::path::PathBuf;
use anyhow::{anyhow, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }

    /// Modelo de chat por defecto de cada proveedor.
    pub fn default_chat_model(self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o-mini",
            Self::Gemini => "gemini-3-pro-preview",
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub data_dir: PathBuf,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,

    pub github_api_url: String,
    pub github_raw_url: String,
    pub github_token: Option<String>,
    pub github_fetch_concurrency: usize,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3322".to_string());

        let data_dir = match env::var("DATA_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::data_dir()
                .ok_or_else(|| anyhow!("No se pudo determinar el directorio de datos; define DATA_DIR"))?
                .join("codesensei"),
        };

        let llm_provider_str =
            env::var("LLM_PROVIDER").unwrap_or_else(|_| "gemini".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;

        let llm_chat_model = env::var("LLM_CHAT_MODEL")
            .unwrap_or_else(|_| llm_provider.default_chat_model().to_string());

        let github_api_url = env::var("GITHUB_API_URL")
            .unwrap_or_else(|_| "https://api.github.com".to_string());
        let github_raw_url = env::var("GITHUB_RAW_URL")
            .unwrap_or_else(|_| "https://raw.githubusercontent.com".to_string());
        let github_token = env::var("GITHUB_TOKEN").ok().filter(|t| !t.trim().is_empty());

        let github_fetch_concurrency = match env::var("GITHUB_FETCH_CONCURRENCY") {
            Ok(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| anyhow!("GITHUB_FETCH_CONCURRENCY debe ser un entero positivo: {raw}"))?,
            Err(_) => 8,
        };

        Ok(Self {
            server_addr,
            data_dir,
            llm_provider,
            llm_chat_model,
            github_api_url,
            github_raw_url,
            github_token,
            github_fetch_concurrency,
        })
    }
}
