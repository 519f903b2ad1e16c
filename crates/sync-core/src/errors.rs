//! Errores del orquestador y de los handlers de step.
//!
//! `CoreEngineError` cubre registro/validación de DAGs y control de
//! ejecuciones. `StepError` es el error "declarado" que devuelve un handler;
//! su `kind` alimenta la clasificación del Recovery System.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum CoreEngineError {
    #[error("step '{step}' depends on unknown step '{dependency}'")]
    InvalidDependency { step: String, dependency: String },
    #[error("step '{0}' depends on itself")]
    SelfDependency(String),
    #[error("dependency graph contains a cycle among steps {0:?}")]
    CyclicGraph(Vec<String>),
    #[error("duplicate step id '{0}'")]
    DuplicateStep(String),
    #[error("workflow definition '{0}' has no steps")]
    EmptyWorkflow(String),
    #[error("workflow definition '{0}' not registered")]
    UnknownWorkflow(String),
    #[error("no handler registered for step type '{0}'")]
    NoHandler(String),
    #[error("execution {0} not found")]
    UnknownExecution(Uuid),
    #[error("execution {0} already terminal")]
    ExecutionTerminal(Uuid),
    #[error("execution {id} cannot go from {from} to {to}")]
    InvalidTransition { id: Uuid, from: String, to: String },
    #[error("internal: {0}")]
    Internal(String),
}

/// Errores del Checkpoint Store (memoria o Postgres).
#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum CheckpointError {
    #[error("checkpoint storage error: {0}")]
    Storage(String),
    #[error("checkpoint serialization error: {0}")]
    Serialization(String),
    #[error("unknown checkpoint type '{0}'")]
    InvalidKind(String),
}

/// Errores del Recovery System.
#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum RecoveryError {
    /// `attempt >= max_retries`: fallo permanente, no se reintenta más.
    #[error("retries exhausted after {attempt} attempts (max {max_retries})")]
    RetriesExhausted { attempt: u32, max_retries: u32 },
    #[error("error {0} not found")]
    UnknownError(Uuid),
    #[error("recovery operation failed: {0}")]
    OperationFailed(String),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Error devuelto por un `StepHandler`.
///
/// `kind` es el tipo declarado (p.ej. `connection`, `timeout`,
/// `validation`, `ConnectionRefused`...). El clasificador usa `kind` y
/// `message` de forma heurística; no hace falta una taxonomía cerrada.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct StepError {
    pub kind: String,
    pub message: String,
}

impl StepError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind: kind.into(),
               message: message.into() }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new("connection", message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new("timeout", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("conflict", message)
    }

    /// Señal de cancelación cooperativa observada por el handler.
    pub fn cancelled() -> Self {
        Self::new("cancelled", "step cancelled")
    }

    pub fn is_cancellation(&self) -> bool {
        self.kind == "cancelled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dag_errors_are_distinct_and_stable() {
        let a = CoreEngineError::InvalidDependency { step: "b".into(),
                                                     dependency: "zz".into() };
        let b = CoreEngineError::SelfDependency("a".into());
        let c = CoreEngineError::CyclicGraph(vec!["a".into(), "b".into()]);
        assert_eq!(a.to_string(), "step 'b' depends on unknown step 'zz'");
        assert_eq!(b.to_string(), "step 'a' depends on itself");
        assert!(c.to_string().starts_with("dependency graph contains a cycle"));
        assert_ne!(a, b);
    }

    #[test]
    fn step_error_display_includes_kind() {
        let e = StepError::connection("refused");
        assert_eq!(e.to_string(), "connection: refused");
        assert!(!e.is_cancellation());
        assert!(StepError::cancelled().is_cancellation());
    }

    #[test]
    fn checkpoint_errors_lift_into_recovery() {
        let e: RecoveryError = CheckpointError::InvalidKind("weird".into()).into();
        assert_eq!(e.to_string(), "unknown checkpoint type 'weird'");
    }
}
