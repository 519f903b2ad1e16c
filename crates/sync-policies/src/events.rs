use serde::{Deserialize, Serialize};
use sync_core::NamedEvent;
use sync_domain::ConflictKind;
use uuid::Uuid;

use crate::conflict::{Conflict, ConflictStatus};
use crate::policy::ResolutionStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictEventKind {
    Detected,
    Resolved,
    Failed,
    Pending,
}

/// Evento del Conflict Resolver (`conflict.detected`, `conflict.resolved`...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictEvent {
    pub kind: ConflictEventKind,
    pub conflict_id: Uuid,
    pub table: String,
    pub record_id: String,
    pub conflict_kind: ConflictKind,
    pub status: ConflictStatus,
    pub strategy: Option<ResolutionStrategy>,
}

impl ConflictEvent {
    pub fn of(kind: ConflictEventKind, conflict: &Conflict) -> Self {
        Self { kind,
               conflict_id: conflict.id,
               table: conflict.table.clone(),
               record_id: conflict.record_id.clone(),
               conflict_kind: conflict.kind,
               status: conflict.status,
               strategy: conflict.resolution.as_ref().map(|r| r.strategy) }
    }
}

impl NamedEvent for ConflictEvent {
    fn name(&self) -> &'static str {
        match self.kind {
            ConflictEventKind::Detected => "conflict.detected",
            ConflictEventKind::Resolved => "conflict.resolved",
            ConflictEventKind::Failed => "conflict.failed",
            ConflictEventKind::Pending => "conflict.pending",
        }
    }
}
