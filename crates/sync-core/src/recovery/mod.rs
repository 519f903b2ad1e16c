//! Recovery System.
//!
//! Rol en el flujo:
//! - El orquestador entrega cada error de step a `RecoverySystem::handle_error`
//!   y obedece la `RecoveryAction` devuelta (reintentar con backoff, omitir,
//!   fallar).
//! - Dueño del `CheckpointStore`: crea checkpoints (con poda por retención) y
//!   resuelve el más reciente para reanudar jobs.
//! - Mantiene una cola de acciones procesada por un loop dedicado.

mod backoff;
mod checkpoint;
mod circuit;
mod classify;
mod processor;
mod system;

pub use backoff::{BackoffKind, BackoffPolicy};
pub use checkpoint::{Checkpoint, CheckpointKind, CheckpointStore, InMemoryCheckpointStore};
pub use circuit::{CircuitBreakerConfig, CircuitBreakers, CircuitState};
pub use classify::{ErrorClass, ErrorClassifier, Severity};
pub use processor::{operation_fn, RecoveryOperation};
pub use system::{retention_cutoff, ActionOutcome, CheckpointSummary, ErrorContext, ErrorInfo, ErrorSummary, RecoveryAction,
                 RecoveryConfig, RecoveryStrategy, RecoverySystem};
