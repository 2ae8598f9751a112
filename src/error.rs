//! Error types shared by the playback core.
//!
//! The core reports failures with [`PlayerError`]; the binary edges (startup,
//! chat commands) wrap them in `anyhow` like the rest of the bot.

use thiserror::Error;

pub type PlayerResult<T> = std::result::Result<T, PlayerError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    /// El track no pudo convertirse en un archivo reproducible
    #[error("No se pudo resolver '{title}': {reason}")]
    Resolution { title: String, reason: String },

    /// Entrada rechazada antes de tocar cualquier estado
    #[error("Valor inválido: {0}")]
    Validation(String),

    /// Sin conexión de voz (o conexión perdida)
    #[error("Transporte de audio no disponible: {0}")]
    Transport(String),

    #[error("No encontrado: {0}")]
    NotFound(String),

    #[error("La cola está vacía")]
    EmptyQueue,

    /// Operación ilegal para el estado actual de la sesión
    #[error("Estado inválido: {0}")]
    InvalidState(String),

    #[error("Error de almacenamiento: {0}")]
    Storage(String),
}

impl PlayerError {
    pub fn resolution(title: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Resolution {
            title: title.into(),
            reason: reason.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

impl From<std::io::Error> for PlayerError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PlayerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
