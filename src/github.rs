//! Cliente mínimo de GitHub: metadatos del repositorio, listado recursivo del
//! árbol y descarga de contenido a través del espejo `raw.githubusercontent.com`
//! (no consume cuota de la API REST).

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use reqwest::{header::HeaderMap, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::{config::AppConfig, error::IngestError};

/// Identifica un repositorio como `owner/repo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    /// Extrae `owner/repo` de cualquier URL que contenga `github.com/{owner}/{repo}`.
    pub fn parse(url: &str) -> Result<Self, IngestError> {
        let invalid = || IngestError::InvalidUrl(url.to_string());

        let (_, rest) = url.split_once("github.com/").ok_or_else(invalid)?;
        let rest = rest.split(['?', '#']).next().unwrap_or_default();
        let mut parts = rest.split('/');

        let owner = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let repo = parts
            .next()
            .map(|s| s.trim_end_matches(".git"))
            .filter(|s| !s.is_empty())
            .ok_or_else(invalid)?;

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }
}

/// Metadatos del repositorio que se muestran junto al proyecto.
#[derive(Debug, Clone, Serialize)]
pub struct RepoMetadata {
    pub name: String,
    pub owner: String,
    pub description: String,
    pub stars: u64,
    pub default_branch: String,
    pub updated_at: String,
    pub last_commit_hash: String,
}

/// Entrada del árbol recursivo (`blob` = fichero, `tree` = directorio).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }
}

// --- Respuestas de la API REST ---

#[derive(Deserialize)]
struct RepoResponse {
    name: String,
    owner: OwnerResponse,
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    default_branch: String,
    #[serde(default)]
    updated_at: String,
}

#[derive(Deserialize)]
struct OwnerResponse {
    login: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    raw_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(api_url: &str, raw_url: &str, token: Option<String>) -> Result<Self> {
        // GitHub rechaza peticiones sin User-Agent.
        let http = reqwest::Client::builder()
            .user_agent(concat!("codesensei/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            raw_url: raw_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Self::new(&cfg.github_api_url, &cfg.github_raw_url, cfg.github_token.clone())
    }

    /// Devuelve una copia del cliente que usa `token` (si se indica) en lugar
    /// del token configurado.
    pub fn with_token(&self, token: Option<String>) -> Self {
        match token.filter(|t| !t.trim().is_empty()) {
            Some(token) => Self {
                token: Some(token),
                ..self.clone()
            },
            None => self.clone(),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("token {token}")),
            None => request,
        }
    }

    fn api_get(&self, path: &str) -> RequestBuilder {
        let request = self
            .http
            .get(format!("{}{path}", self.api_url))
            .header("Accept", "application/vnd.github.v3+json");
        self.authorized(request)
    }

    /// Obtiene los metadatos del repositorio. El hash del último commit se
    /// consulta aparte y su fallo no es fatal.
    pub async fn fetch_repo_metadata(&self, repo: &RepoRef) -> Result<RepoMetadata, IngestError> {
        let response = self
            .api_get(&format!("/repos/{}/{}", repo.owner, repo.repo))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                return Err(rate_limited(response.headers()));
            }
            _ => return Err(IngestError::NotFound),
        }

        let data: RepoResponse = response.json().await?;
        let last_commit_hash = match self.fetch_last_commit(repo, &data.default_branch).await {
            Ok(sha) => sha,
            Err(err) => {
                warn!("No se pudo obtener el último commit de {}/{}: {err}", repo.owner, repo.repo);
                "unknown".to_string()
            }
        };

        Ok(RepoMetadata {
            name: data.name,
            owner: data.owner.login,
            description: data
                .description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| "Sin descripción.".to_string()),
            stars: data.stargazers_count,
            default_branch: data.default_branch,
            updated_at: data.updated_at,
            last_commit_hash,
        })
    }

    async fn fetch_last_commit(&self, repo: &RepoRef, branch: &str) -> Result<String> {
        let response = self
            .api_get(&format!("/repos/{}/{}/commits/{branch}", repo.owner, repo.repo))
            .send()
            .await?
            .error_for_status()?;
        let commit: CommitResponse = response.json().await?;
        Ok(commit.sha.chars().take(7).collect())
    }

    /// Lista recursivamente todas las entradas del árbol de `branch`.
    /// Un fallo aquí aborta la ingesta completa.
    pub async fn list_tree(&self, repo: &RepoRef, branch: &str) -> Result<Vec<TreeEntry>, IngestError> {
        let response = self
            .api_get(&format!("/repos/{}/{}/git/trees/{branch}", repo.owner, repo.repo))
            .query(&[("recursive", "1")])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                return Err(rate_limited(response.headers()));
            }
            StatusCode::NOT_FOUND => return Err(IngestError::NotFound),
            other => return Err(IngestError::Status(other.as_u16())),
        }

        let data: TreeResponse = response.json().await?;
        if data.truncated {
            warn!("El árbol de {}/{} viene truncado por GitHub", repo.owner, repo.repo);
        }
        info!("Árbol de {}/{}@{branch}: {} entradas", repo.owner, repo.repo, data.tree.len());
        Ok(data.tree)
    }

    /// Descarga el contenido de un fichero desde el espejo de contenido bruto.
    pub async fn fetch_raw(&self, repo: &RepoRef, branch: &str, path: &str) -> Result<String> {
        let mut url = Url::parse(&self.raw_url)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("URL base de contenido no válida: {}", self.raw_url))?
            .pop_if_empty()
            .push(&repo.owner)
            .push(&repo.repo)
            .extend(branch.split('/'))
            .extend(path.split('/'));

        let response = self
            .authorized(self.http.get(url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}

fn rate_limited(headers: &HeaderMap) -> IngestError {
    let reset_at = headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(format_reset_time)
        .unwrap_or_else(|| "hora desconocida".to_string());
    IngestError::RateLimited { reset_at }
}

/// Convierte el epoch de `x-ratelimit-reset` a hora local legible.
pub fn format_reset_time(epoch_secs: i64) -> Option<String> {
    DateTime::from_timestamp(epoch_secs, 0)
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
}
