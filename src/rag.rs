//! Consulta RAG sobre el código indexado de un proyecto.
//!
//! Flujo:
//!   1. Se recupera el bloque de contexto del proyecto (todos sus ficheros).
//!   2. Se construye el prompt con el resumen del proyecto y la pregunta.
//!   3. El LLM responde con temperatura baja.
//!   4. Pregunta y respuesta se guardan en el historial del proyecto.

use std::future::Future;

use anyhow::Result;
use tracing::{error, info};

use crate::{
    context_store::ContextStore,
    llm::LlmManager,
    models::{ChatMessage, Project, Role},
    projects::ProjectRegistry,
};

/// Respuesta cuando el modelo devuelve texto vacío.
pub const EMPTY_ANSWER: &str = "Lo siento, no he podido procesar esa petición.";
/// Respuesta cuando la llamada al modelo falla.
pub const FAILED_ANSWER: &str = "Algo ha fallado mientras pensaba. Por favor, inténtalo de nuevo.";

/// Temperatura baja: se prioriza la fidelidad al contexto.
const ANSWER_TEMPERATURE: f64 = 0.1;

const SYSTEM_PROMPT: &str = r#"
You are CodeSensei, an expert senior software architect.
You help developers understand complex codebases.
"#;

/// Construye el prompt completo para una pregunta sobre el proyecto.
pub fn build_prompt(question: &str, project_description: &str, codebase_context: &str) -> String {
    format!(
        "PROJECT SUMMARY:\n{project_description}\n\n\
         CODEBASE CONTEXT (indexed from repository):\n{codebase_context}\n\n\
         STRICT RULES:\n\
         - Use the provided CODEBASE CONTEXT to give specific, accurate answers based on the actual implementation.\n\
         - If the information isn't in the context, say you don't know rather than hallucinating.\n\
         - Be concise but thorough. Use code blocks for implementation details.\n\n\
         USER QUESTION:\n{question}"
    )
}

/// Responde a `question` con el contexto indexado del proyecto.
/// Un fallo del LLM no se propaga: se devuelve `FAILED_ANSWER`.
pub async fn answer(store: &ContextStore, llm: &LlmManager, project: &Project, question: &str) -> String {
    answer_with(store, project, question, |prompt| async move {
        llm.complete(SYSTEM_PROMPT, &prompt, Some(ANSWER_TEMPERATURE)).await
    })
    .await
}

/// Igual que `answer`, pero la llamada al modelo la hace `complete`,
/// que recibe el prompt ya construido.
async fn answer_with<F, Fut>(store: &ContextStore, project: &Project, question: &str, complete: F) -> String
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let context = store.context_for(&project.id);
    let prompt = build_prompt(question, &project.description, &context);
    info!(
        "Consulta sobre {} ({} ficheros en contexto)",
        project.id,
        store.file_count(&project.id)
    );

    match complete(prompt).await {
        Ok(text) if text.trim().is_empty() => EMPTY_ANSWER.to_string(),
        Ok(text) => text,
        Err(e) => {
            error!("Error de la API del LLM: {e:#}");
            FAILED_ANSWER.to_string()
        }
    }
}

/// Registra la pregunta, obtiene la respuesta y la registra también.
/// Devuelve el mensaje del asistente.
pub async fn ask(
    store: &ContextStore,
    llm: &LlmManager,
    projects: &ProjectRegistry,
    project: &Project,
    question: &str,
) -> Result<ChatMessage> {
    record_exchange(projects, project, question, answer(store, llm, project, question)).await
}

/// `reply` no se ejecuta hasta que la pregunta ha quedado guardada.
async fn record_exchange(
    projects: &ProjectRegistry,
    project: &Project,
    question: &str,
    reply: impl Future<Output = String>,
) -> Result<ChatMessage> {
    projects.add_message(&project.id, Role::User, question).await?;
    let text = reply.await;
    projects.add_message(&project.id, Role::Assistant, &text).await
}
