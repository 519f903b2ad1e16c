use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::step::StepStatus;

/// Estado agregado de una ejecución.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Partial,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Partial | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Resultado de un step dentro de una ejecución. Sólo lo muta el camino de
/// ejecución del propio step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    pub error: Option<String>,
    pub retry_count: u32,
    pub records_processed: u64,
    pub output: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepResult {
    pub fn pending(step_id: impl Into<String>) -> Self {
        Self { step_id: step_id.into(),
               status: StepStatus::Pending,
               error: None,
               retry_count: 0,
               records_processed: 0,
               output: None,
               started_at: None,
               finished_at: None }
    }
}

/// Error visible por operador: uno por step fallido.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub step_id: String,
    /// Tipo clasificado por el Recovery System (`connection`, `timeout`...).
    pub error_type: String,
    pub message: String,
}

/// Snapshot observable de una ejecución.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub execution_id: Uuid,
    pub workflow_id: String,
    pub job_id: String,
    pub status: WorkflowStatus,
    /// Un `StepResult` por step, en el orden de la definición.
    pub steps: Vec<StepResult>,
    pub errors: Vec<ExecutionError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowResult {
    pub fn step(&self, step_id: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn records_processed(&self) -> u64 {
        self.steps.iter().map(|s| s.records_processed).sum()
    }

    pub fn total_retries(&self) -> u32 {
        self.steps.iter().map(|s| s.retry_count).sum()
    }
}
