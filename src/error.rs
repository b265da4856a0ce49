//! Errores tipados de la ingesta. El llamador necesita distinguir un límite
//! de peticiones de un repositorio inexistente para informar al usuario.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Límite de peticiones de la API de GitHub excedido. Se restablece a las {reset_at}.")]
    RateLimited { reset_at: String },

    #[error("Repositorio no encontrado o privado.")]
    NotFound,

    #[error("No se pudo obtener el árbol del repositorio (estado HTTP: {0}).")]
    Status(u16),

    #[error("El repositorio parece vacío o inaccesible.")]
    Empty,

    #[error("Formato de URL de GitHub no válido: {0}")]
    InvalidUrl(String),

    #[error("La ruta no es un directorio: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Error de red contra GitHub: {0}")]
    Request(#[from] reqwest::Error),
}
