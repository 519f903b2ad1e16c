//! Entidad `Conflict` y su máquina de estados.
//!
//! `detected -> resolving -> {resolved | failed | pending_manual | skipped}`.
//! Un fallo reintentable devuelve `resolving -> detected`. `pending_manual`
//! sólo sale por `resolve_manually` (a `resolved`) o `reject_manually` (a
//! `rejected`). Esa decisión manual queda abierta hasta que el pipeline la
//! aplica y la marca con `applied_at`.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sync_domain::{ConflictKind, DataVersion, DetectedConflict};
use uuid::Uuid;

use crate::policy::ResolutionStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Detected,
    Resolving,
    Resolved,
    Failed,
    PendingManual,
    Skipped,
    Rejected,
}

impl ConflictStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Failed | Self::Skipped | Self::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
            Self::Failed => "failed",
            Self::PendingManual => "pending_manual",
            Self::Skipped => "skipped",
            Self::Rejected => "rejected",
        }
    }
}

/// Valor resuelto: datos a escribir o borrado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedValue {
    pub data: Option<Map<String, Value>>,
    pub deleted: bool,
    /// Origen del lado ganador, si hubo uno.
    pub winner: Option<String>,
}

impl ResolvedValue {
    pub fn data(data: Map<String, Value>, winner: Option<String>) -> Self {
        Self { data: Some(data),
               deleted: false,
               winner }
    }

    pub fn from_side(side: &DataVersion) -> Self {
        Self { data: if side.deleted { None } else { Some(side.payload.clone()) },
               deleted: side.deleted,
               winner: Some(side.origin.clone()) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    pub strategy: ResolutionStrategy,
    pub value: Option<ResolvedValue>,
    pub resolved_at: DateTime<Utc>,
    pub actor: Option<String>,
    pub reason: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: Uuid,
    pub record_id: String,
    pub table: String,
    pub kind: ConflictKind,
    pub source: DataVersion,
    pub target: DataVersion,
    pub status: ConflictStatus,
    pub resolution: Option<ResolutionRecord>,
    /// Mayor = más urgente (delete > version > content > schema).
    pub priority: u8,
    pub fields: Vec<String>,
    pub detected_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Momento en que el pipeline escribió (o descartó) la decisión manual.
    #[serde(default)]
    pub applied_at: Option<DateTime<Utc>>,
}

pub fn priority_of(kind: ConflictKind) -> u8 {
    match kind {
        ConflictKind::Delete => 4,
        ConflictKind::Version => 3,
        ConflictKind::Content => 2,
        ConflictKind::Schema => 1,
    }
}

impl Conflict {
    pub fn new(table: impl Into<String>, kind: ConflictKind, source: DataVersion, target: DataVersion) -> Self {
        Self { id: Uuid::new_v4(),
               record_id: source.record_id.clone(),
               table: table.into(),
               kind,
               source,
               target,
               status: ConflictStatus::Detected,
               resolution: None,
               priority: priority_of(kind),
               fields: Vec::new(),
               detected_at: Utc::now(),
               attempts: 0,
               last_error: None,
               applied_at: None }
    }

    pub fn from_detected(table: impl Into<String>, detected: &DetectedConflict, source: DataVersion, target: DataVersion) -> Self {
        let mut c = Self::new(table, detected.kind, source, target);
        c.fields = detected.fields.clone();
        c
    }

    /// Lado más reciente por timestamp; empate o sin timestamps: `source`.
    pub fn newer(&self) -> &DataVersion {
        match (self.source.timestamp, self.target.timestamp) {
            (Some(s), Some(t)) if t > s => &self.target,
            (None, Some(_)) => &self.target,
            _ => &self.source,
        }
    }

    pub fn older(&self) -> &DataVersion {
        if std::ptr::eq(self.newer(), &self.source) {
            &self.target
        } else {
            &self.source
        }
    }

    pub fn resolved_value(&self) -> Option<&ResolvedValue> {
        self.resolution.as_ref().and_then(|r| r.value.as_ref())
    }

    /// Decisión de un operador (resuelta o rechazada) que el pipeline aún no
    /// ha aplicado.
    pub fn awaiting_apply(&self) -> bool {
        matches!(self.status, ConflictStatus::Resolved | ConflictStatus::Rejected)
        && self.applied_at.is_none()
        && self.resolution.as_ref().map_or(false, |r| r.actor.is_some())
    }

    /// Puede olvidarse sin perder trabajo pendiente.
    pub fn is_settled(&self) -> bool {
        self.status.is_terminal() && !self.awaiting_apply()
    }
}
