use serde::{Deserialize, Serialize};

/// Estado de un step dentro de una ejecución.
///
/// Transiciones válidas:
/// - `Pending` -> `Running` | `Skipped` | `Cancelled`
/// - `Running` -> `Completed` | `Failed` | `Skipped` | `Cancelled`
///
/// Un step terminal nunca vuelve a `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }
}
