//! sync-core: orquestador de workflows DAG y Recovery System.
pub mod constants;
pub mod engine;
pub mod errors;
pub mod event;
pub mod hashing;
pub mod locks;
pub mod model;
pub mod recovery;
pub mod repo;
pub mod step;

pub use engine::{Orchestrator, OrchestratorBuilder, OrchestratorConfig, OrchestratorStats, WorkflowSummary};
pub use errors::{CheckpointError, CoreEngineError, RecoveryError, StepError};
pub use event::{EventBus, EventListener, EventStore, FlowEvent, FlowEventKind, InMemoryEventStore, ListenerId, NamedEvent};
pub use model::{ExecutionContext, ExecutionError, StepResult, WorkflowResult, WorkflowStatus};
pub use recovery::{retention_cutoff, Checkpoint, CheckpointKind, CheckpointStore, ErrorContext, InMemoryCheckpointStore,
                   RecoveryAction, RecoveryConfig, RecoveryStrategy, RecoverySystem};
pub use repo::{WorkflowDefinition, WorkflowRepository};
pub use step::{handler_fn, RetryConfig, RetryStrategy, StepHandler, StepKind, StepOutput, StepStatus, WorkflowStep};
