use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use crate::{
    config::AppConfig, context_store::ContextStore, github::GithubClient, llm::LlmManager,
    projects::ProjectRegistry,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub github: GithubClient,
    pub llm_manager: LlmManager,
    pub context_store: Arc<ContextStore>,
    pub projects: Arc<ProjectRegistry>,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}

impl Status {
    pub fn update(status: &Mutex<Status>, message: impl Into<String>, progress: f32) {
        let mut status = status.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        status.message = message.into();
        status.progress = progress;
    }
}
