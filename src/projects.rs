//! Registro de proyectos e historial de chat.
//!
//! Todo vive en memoria y se vuelca a `projects.json` en el directorio de
//! datos tras cada escritura, de modo que el listado y el historial
//! sobreviven a un reinicio (el índice de contexto no).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::{fs, sync::Mutex};
use tracing::info;
use uuid::Uuid;

use crate::models::{ChatMessage, NewProject, Project, Role};

const SNAPSHOT_FILE: &str = "projects.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    projects: Vec<Project>,
    messages: Vec<ChatMessage>,
}

/// `Default` crea un registro sólo en memoria.
#[derive(Debug, Default)]
pub struct ProjectRegistry {
    data: Mutex<Snapshot>,
    snapshot_path: Option<PathBuf>,
}

impl ProjectRegistry {
    /// Abre (o crea) el registro persistido en `data_dir`.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("No se pudo crear el directorio de datos {}", data_dir.display()))?;

        let snapshot_path = data_dir.join(SNAPSHOT_FILE);
        let snapshot = match fs::read_to_string(&snapshot_path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Fichero de proyectos corrupto: {}", snapshot_path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "Registro de proyectos cargado: {} proyectos, {} mensajes",
            snapshot.projects.len(),
            snapshot.messages.len()
        );

        Ok(Self {
            data: Mutex::new(snapshot),
            snapshot_path: Some(snapshot_path),
        })
    }

    async fn persist(&self, data: &Snapshot) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let raw = serde_json::to_string_pretty(data)?;
        fs::write(path, raw)
            .await
            .with_context(|| format!("No se pudo guardar {}", path.display()))
    }

    pub async fn create_project(&self, new: NewProject) -> Result<Project> {
        let project = Project {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            description: new.description,
            source_type: new.source_type,
            github: new.github,
            created_at: Utc::now(),
        };

        let mut data = self.data.lock().await;
        data.projects.push(project.clone());
        if let Err(e) = self.persist(&data).await {
            // Sin volcado no hay alta: se deshace bajo el mismo candado.
            data.projects.pop();
            return Err(e);
        }
        info!("Proyecto creado: {} ({})", project.name, project.id);
        Ok(project)
    }

    /// Proyectos del más reciente al más antiguo.
    pub async fn list_projects(&self) -> Vec<Project> {
        let data = self.data.lock().await;
        let mut projects = data.projects.clone();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        projects
    }

    pub async fn get_project(&self, id: &str) -> Option<Project> {
        let data = self.data.lock().await;
        data.projects.iter().find(|p| p.id == id).cloned()
    }

    pub async fn add_message(&self, project_id: &str, role: Role, content: &str) -> Result<ChatMessage> {
        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        };

        let mut data = self.data.lock().await;
        data.messages.push(message.clone());
        if let Err(e) = self.persist(&data).await {
            data.messages.pop();
            return Err(e);
        }
        Ok(message)
    }

    /// Historial del proyecto en orden cronológico.
    pub async fn history(&self, project_id: &str) -> Vec<ChatMessage> {
        let data = self.data.lock().await;
        let mut messages: Vec<ChatMessage> = data
            .messages
            .iter()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        messages
    }
}
