//! Tipos de evento del orquestador y estructura `FlowEvent`.
//!
//! Rol en el flujo:
//! - Cada ejecución emite eventos a un `EventStore` append-only (historial
//!   consultable) y al `EventBus` (listeners en vivo).
//! - `FlowEventKind::name()` es el contrato observable y estable
//!   (`workflow.started`, `step.completed`, ...).
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::NamedEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlowEventKind {
    /// Primer evento de toda ejecución.
    WorkflowStarted { workflow_id: String, step_count: usize, resumed_steps: usize },
    StepStarted { step_id: String, attempt: u32 },
    StepCompleted { step_id: String, records_processed: u64, output_hash: String },
    /// El Recovery System decidió redespachar el step tras `delay_ms`.
    StepRetrying { step_id: String, attempt: u32, delay_ms: u64, strategy: String },
    StepFailed { step_id: String, error_type: String, message: String },
    /// Step omitido: por estrategia `skipAndContinue` o bloqueado por una
    /// dependencia que no completó.
    StepSkipped { step_id: String, reason: String },
    WorkflowPaused,
    WorkflowResumed,
    CheckpointCreated { checkpoint_id: Uuid, completed_steps: usize },
    WorkflowCompleted,
    WorkflowPartial { failed_steps: Vec<String> },
    WorkflowFailed { failed_steps: Vec<String> },
    WorkflowCancelled,
}

impl FlowEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } => "workflow.started",
            Self::StepStarted { .. } => "step.started",
            Self::StepCompleted { .. } => "step.completed",
            Self::StepRetrying { .. } => "step.retrying",
            Self::StepFailed { .. } => "step.failed",
            Self::StepSkipped { .. } => "step.skipped",
            Self::WorkflowPaused => "workflow.paused",
            Self::WorkflowResumed => "workflow.resumed",
            Self::CheckpointCreated { .. } => "checkpoint.created",
            Self::WorkflowCompleted => "workflow.completed",
            Self::WorkflowPartial { .. } => "workflow.partial",
            Self::WorkflowFailed { .. } => "workflow.failed",
            Self::WorkflowCancelled => "workflow.cancelled",
        }
    }

    pub fn step_id(&self) -> Option<&str> {
        match self {
            Self::StepStarted { step_id, .. }
            | Self::StepCompleted { step_id, .. }
            | Self::StepRetrying { step_id, .. }
            | Self::StepFailed { step_id, .. }
            | Self::StepSkipped { step_id, .. } => Some(step_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
    pub seq: u64, // asignado por el EventStore (orden append por ejecución)
    pub flow_id: Uuid,
    pub kind: FlowEventKind,
    pub ts: DateTime<Utc>,
}

impl NamedEvent for FlowEvent {
    fn name(&self) -> &'static str {
        self.kind.name()
    }
}
