//! Modelos de dominio (ficheros indexados, proyectos y mensajes de chat).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Un fichero de texto listo para indexar.
/// `path` es relativo a la raíz del repositorio y usa `/` como separador.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub content: String,
    pub size: u64,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            size: content.len() as u64,
            content,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Local,
    Github,
}

/// Datos del repositorio remoto asociados a un proyecto de GitHub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubData {
    pub url: String,
    pub owner: String,
    pub repo_name: String,
    pub branch: String,
    pub stars: u64,
    pub last_commit_hash: String,
    pub last_updated: String,
}

/// Proyecto analizado. El `id` es la clave que comparten el índice de
/// contexto y el historial de chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub source_type: SourceType,
    pub github: Option<GithubData>,
    pub created_at: DateTime<Utc>,
}

/// Datos necesarios para dar de alta un proyecto (el registro asigna id y fecha).
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub description: String,
    pub source_type: SourceType,
    pub github: Option<GithubData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub project_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Contenido de una carpeta tal como lo muestra el selector de proyecto
/// local, con lo que la ingesta haría con cada entrada.
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryListing {
    pub path: PathBuf,
    pub parent: Option<PathBuf>,
    pub entries: Vec<DirectoryEntry>,
    /// Ficheros indexables directamente en esta carpeta.
    pub indexable_files: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectoryEntry {
    pub path: PathBuf,
    pub name: String,
    pub is_dir: bool,
    /// Fichero con extensión permitida.
    pub indexable: bool,
    /// Carpeta que la ingesta local no recorre.
    pub ignored: bool,
}
