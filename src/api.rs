use std::path::{Path, PathBuf};
use axum::{
    extract::{self, Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    app_state::{AppState, Status},
    error::IngestError,
    github::{RepoMetadata, RepoRef},
    ingest,
    models::{
        ChatMessage, DirectoryEntry, DirectoryListing, FileRecord, GithubData, NewProject, Project,
        SourceType,
    },
    rag,
};

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads y Respuestas de la API ---

/// Ruta de carpeta; vacía en el explorador significa el home del usuario.
#[derive(Deserialize)]
pub struct SelectDirPayload {
    #[serde(default)]
    path: String,
}

#[derive(Deserialize)]
pub struct GithubImportPayload {
    url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
pub struct AskPayload {
    question: String,
}

/// Proyecto junto con el número de ficheros que hay en su índice.
#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    #[serde(flatten)]
    project: Project,
    indexed_files: usize,
}

#[derive(Debug, Serialize)]
pub struct DiagramResponse {
    diagram: String,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/list-directory", post(list_directory_handler))
        .route("/api/projects", get(list_projects_handler))
        .route("/api/projects/local", post(import_local_handler))
        .route("/api/projects/github", post(import_github_handler))
        .route("/api/projects/:id", get(get_project_handler))
        .route("/api/projects/:id/messages", get(messages_handler))
        .route("/api/projects/:id/ask", post(ask_handler))
        .route("/api/projects/:id/diagram", get(diagram_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

fn ingest_error(err: IngestError) -> ApiError {
    let status = match &err {
        IngestError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        IngestError::NotFound => StatusCode::NOT_FOUND,
        IngestError::InvalidUrl(_) | IngestError::NotADirectory(_) => StatusCode::BAD_REQUEST,
        IngestError::Empty => StatusCode::UNPROCESSABLE_ENTITY,
        IngestError::Status(_) | IngestError::Request(_) => StatusCode::BAD_GATEWAY,
    };
    api_error(status, err.to_string())
}

fn internal_error(err: anyhow::Error) -> ApiError {
    error!("Error interno: {err:#}");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

// --- Estado de ocupación ---

fn set_busy(state: &AppState, message: &str) {
    let mut status = state.status.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    status.is_busy = true;
    status.message = message.to_string();
    status.progress = 0.0;
}

fn finish<T>(state: &AppState, result: &Result<T, ApiError>, success: &str) {
    let mut status = state.status.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    status.is_busy = false;
    status.progress = 0.0;
    status.message = match result {
        Ok(_) => success.to_string(),
        Err((_, Json(body))) => format!(
            "Error en la indexación: {}",
            body["error"].as_str().unwrap_or("desconocido")
        ),
    };
}

// --- Handlers ---

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.status.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
    Json(status)
}

#[axum::debug_handler]
async fn list_directory_handler(
    Json(payload): Json<SelectDirPayload>,
) -> Result<Json<DirectoryListing>, ApiError> {
    let path = match payload.path.trim() {
        "" => dirs::home_dir().ok_or_else(|| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "No se pudo determinar el directorio home del usuario.",
            )
        })?,
        raw => PathBuf::from(raw),
    };

    tokio::task::spawn_blocking(move || list_directory(&path))
        .await
        .map_err(|e| internal_error(e.into()))?
        .map(Json)
}

#[axum::debug_handler]
async fn list_projects_handler(State(state): State<AppState>) -> Json<Vec<ProjectResponse>> {
    let projects = state.projects.list_projects().await;
    Json(projects.into_iter().map(|p| with_file_count(&state, p)).collect())
}

#[axum::debug_handler]
async fn get_project_handler(
    State(state): State<AppState>,
    extract::Path(id): extract::Path<String>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let project = find_project(&state, &id).await?;
    Ok(Json(with_file_count(&state, project)))
}

#[axum::debug_handler]
async fn import_local_handler(
    State(state): State<AppState>,
    Json(payload): Json<SelectDirPayload>,
) -> Result<Json<ProjectResponse>, ApiError> {
    set_busy(&state, "Leyendo ficheros locales...");
    let result = import_local(&state, PathBuf::from(payload.path)).await;
    finish(&state, &result, "Proyecto local indexado.");
    result.map(Json)
}

async fn import_local(state: &AppState, root: PathBuf) -> Result<ProjectResponse, ApiError> {
    let walk_root = root.clone();
    let (files, summary) = tokio::task::spawn_blocking(move || ingest::ingest_directory(&walk_root))
        .await
        .map_err(|e| internal_error(e.into()))?
        .map_err(ingest_error)?;
    info!("Carpeta {}: {summary}", root.display());

    let name = root
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| root.to_string_lossy().to_string());

    let new_project = NewProject {
        description: format!("Proyecto local: {name}"),
        name,
        source_type: SourceType::Local,
        github: None,
    };
    register_and_index(state, new_project, files).await
}

#[axum::debug_handler]
async fn import_github_handler(
    State(state): State<AppState>,
    Json(payload): Json<GithubImportPayload>,
) -> Result<Json<ProjectResponse>, ApiError> {
    set_busy(&state, "Obteniendo metadatos del repositorio...");
    let result = import_github(&state, payload).await;
    finish(&state, &result, "Repositorio indexado y guardado correctamente.");
    result.map(Json)
}

async fn import_github(state: &AppState, payload: GithubImportPayload) -> Result<ProjectResponse, ApiError> {
    let repo = RepoRef::parse(&payload.url).map_err(ingest_error)?;
    let github = state.github.with_token(payload.token);

    let metadata = github.fetch_repo_metadata(&repo).await.map_err(ingest_error)?;
    let (files, summary) = ingest::ingest_github(
        &github,
        &repo,
        &metadata.default_branch,
        state.config.github_fetch_concurrency,
        &state.status,
    )
    .await
    .map_err(ingest_error)?;
    info!("{}/{}: {summary}", repo.owner, repo.repo);

    let new_project = NewProject {
        name: metadata.name.clone(),
        description: metadata.description.clone(),
        source_type: SourceType::Github,
        github: Some(github_data(&payload.url, metadata)),
    };
    register_and_index(state, new_project, files).await
}

/// Da de alta el proyecto y entrega sus ficheros al almacén de contexto.
/// Una ingesta sin ficheros se trata como fallo.
async fn register_and_index(
    state: &AppState,
    new_project: NewProject,
    files: Vec<FileRecord>,
) -> Result<ProjectResponse, ApiError> {
    if files.is_empty() {
        return Err(ingest_error(IngestError::Empty));
    }

    let project = state
        .projects
        .create_project(new_project)
        .await
        .map_err(internal_error)?;
    state.context_store.index(&project.id, files);
    Ok(with_file_count(state, project))
}

fn github_data(url: &str, metadata: RepoMetadata) -> GithubData {
    let last_updated = DateTime::parse_from_rfc3339(&metadata.updated_at)
        .map(|t| t.format("%d/%m/%Y").to_string())
        .unwrap_or(metadata.updated_at);

    GithubData {
        url: url.to_string(),
        owner: metadata.owner,
        repo_name: metadata.name,
        branch: metadata.default_branch,
        stars: metadata.stars,
        last_commit_hash: metadata.last_commit_hash,
        last_updated,
    }
}

#[axum::debug_handler]
async fn messages_handler(
    State(state): State<AppState>,
    extract::Path(id): extract::Path<String>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let project = find_project(&state, &id).await?;
    Ok(Json(state.projects.history(&project.id).await))
}

#[axum::debug_handler]
async fn ask_handler(
    State(state): State<AppState>,
    extract::Path(id): extract::Path<String>,
    Json(payload): Json<AskPayload>,
) -> Result<Json<ChatMessage>, ApiError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "La pregunta está vacía."));
    }

    let project = find_project(&state, &id).await?;
    rag::ask(
        &state.context_store,
        &state.llm_manager,
        &state.projects,
        &project,
        question,
    )
    .await
    .map(Json)
    .map_err(internal_error)
}

#[axum::debug_handler]
async fn diagram_handler(
    State(state): State<AppState>,
    extract::Path(id): extract::Path<String>,
) -> Result<Json<DiagramResponse>, ApiError> {
    let project = find_project(&state, &id).await?;
    let diagram = state.llm_manager.architecture_diagram(&project.description).await;
    Ok(Json(DiagramResponse { diagram }))
}

// --- Handler de Apagado y Utilidades ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let sender = state
        .shutdown_sender
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .take();
    let Some(sender) = sender else {
        return Err(api_error(StatusCode::CONFLICT, "El apagado ya está en curso."));
    };

    let busy = state.status.lock().unwrap_or_else(std::sync::PoisonError::into_inner).is_busy;
    if busy {
        warn!("Apagado solicitado con una indexación en curso.");
    }
    info!("Petición de apagado recibida.");
    Status::update(&state.status, "Apagando servidor...", 0.0);

    // Si el receptor ya no existe el servidor está cerrando igualmente.
    let _ = sender.send(());
    Ok(StatusCode::ACCEPTED)
}

async fn find_project(state: &AppState, id: &str) -> Result<Project, ApiError> {
    state
        .projects
        .get_project(id)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Proyecto no encontrado: {id}")))
}

fn with_file_count(state: &AppState, project: Project) -> ProjectResponse {
    ProjectResponse {
        indexed_files: state.context_store.file_count(&project.id),
        project,
    }
}

/// Lista una carpeta para el selector de proyecto local, marcando qué
/// entradas acabarían en el índice.
fn list_directory(path: &Path) -> Result<DirectoryListing, ApiError> {
    if !path.is_dir() {
        return Err(ingest_error(IngestError::NotADirectory(path.to_path_buf())));
    }

    let read = std::fs::read_dir(path).map_err(|e| {
        internal_error(anyhow::Error::new(e).context(format!("No se pudo leer {}", path.display())))
    })?;

    let mut entries: Vec<DirectoryEntry> = read
        .filter_map(Result::ok)
        .map(|entry| {
            let path = entry.path();
            let is_dir = path.is_dir();
            let name = entry.file_name().to_string_lossy().into_owned();
            DirectoryEntry {
                indexable: !is_dir && ingest::is_indexable(&name),
                ignored: is_dir && ingest::is_ignored_dir(&name),
                path,
                name,
                is_dir,
            }
        })
        .collect();

    // Carpetas recorribles, ficheros indexables y después el resto.
    fn rank(entry: &DirectoryEntry) -> u8 {
        match (entry.is_dir, entry.ignored, entry.indexable) {
            (true, false, _) => 0,
            (false, _, true) => 1,
            (true, true, _) => 2,
            _ => 3,
        }
    }
    entries.sort_by(|a, b| rank(a).cmp(&rank(b)).then_with(|| a.name.cmp(&b.name)));

    Ok(DirectoryListing {
        path: path.to_path_buf(),
        parent: path.parent().map(Path::to_path_buf),
        indexable_files: entries.iter().filter(|e| e.indexable).count(),
        entries,
    })
}
