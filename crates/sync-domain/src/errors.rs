// errors.rs
use thiserror::Error;

/// Errores del dominio de registros y del detector de cambios.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Error de validación: {0}")]
    ValidationError(String),

    #[error("Error de serialización: {0}")]
    SerializationError(String),

    #[error("No se pudo crear el pool de detección: {0}")]
    PoolError(String),
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::SerializationError(e.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for DomainError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        DomainError::PoolError(e.to_string())
    }
}
