//! Checkpoints: marcadores reanudables por (job, tabla, tipo).
//!
//! Append-only. Dentro de un mismo (job, tabla, tipo) la fecha de creación es
//! estrictamente creciente: si el reloj no avanzó, el store la corrige
//! sumando un microsegundo al último valor conocido.
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use uuid::Uuid;

use crate::errors::CheckpointError;
use crate::locks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    Batch,
    Table,
    Job,
    Transaction,
}

impl CheckpointKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Table => "table",
            Self::Job => "job",
            Self::Transaction => "transaction",
        }
    }
}

impl fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointKind {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "batch" => Ok(Self::Batch),
            "table" => Ok(Self::Table),
            "job" => Ok(Self::Job),
            "transaction" => Ok(Self::Transaction),
            other => Err(CheckpointError::InvalidKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub kind: CheckpointKind,
    pub job_id: String,
    pub table: Option<String>,
    /// Token opaco de reanudación (high-water mark, steps completados...).
    pub position: Value,
    pub snapshot: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(kind: CheckpointKind, job_id: impl Into<String>, table: Option<String>, position: Value) -> Self {
        Self { id: Uuid::new_v4(),
               kind,
               job_id: job_id.into(),
               table,
               position,
               snapshot: None,
               created_at: Utc::now() }
    }

    pub fn with_snapshot(mut self, snapshot: Value) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn matches(&self, job_id: &str, table: Option<&str>, kind: Option<CheckpointKind>) -> bool {
        self.job_id == job_id
        && table.map_or(true, |t| self.table.as_deref() == Some(t))
        && kind.map_or(true, |k| self.kind == k)
    }
}

/// Almacenamiento durable de checkpoints.
pub trait CheckpointStore: Send + Sync {
    /// Persiste el checkpoint y devuelve la versión almacenada (con
    /// `created_at` posiblemente ajustado para ser monótono).
    fn append(&self, checkpoint: Checkpoint) -> Result<Checkpoint, CheckpointError>;
    /// Checkpoint más reciente que coincide con el filtro. `None` en `table`
    /// o `kind` no filtra por ese campo.
    fn latest(&self, job_id: &str, table: Option<&str>, kind: Option<CheckpointKind>) -> Result<Option<Checkpoint>, CheckpointError>;
    /// Todos los checkpoints (de un job si se indica), ordenados por creación.
    fn list(&self, job_id: Option<&str>) -> Result<Vec<Checkpoint>, CheckpointError>;
    /// Elimina los checkpoints creados antes de `cutoff`; devuelve cuántos.
    fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, CheckpointError>;
}

type SeriesKey = (String, Option<String>, CheckpointKind);

#[derive(Default)]
struct Inner {
    rows: Vec<Checkpoint>,
    last_created: HashMap<SeriesKey, DateTime<Utc>>,
}

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    inner: Mutex<Inner>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn append(&self, mut checkpoint: Checkpoint) -> Result<Checkpoint, CheckpointError> {
        let mut inner = locks::lock(&self.inner);
        let key = (checkpoint.job_id.clone(), checkpoint.table.clone(), checkpoint.kind);
        if let Some(last) = inner.last_created.get(&key) {
            if checkpoint.created_at <= *last {
                checkpoint.created_at = *last + ChronoDuration::microseconds(1);
            }
        }
        inner.last_created.insert(key, checkpoint.created_at);
        inner.rows.push(checkpoint.clone());
        Ok(checkpoint)
    }

    fn latest(&self, job_id: &str, table: Option<&str>, kind: Option<CheckpointKind>) -> Result<Option<Checkpoint>, CheckpointError> {
        let inner = locks::lock(&self.inner);
        Ok(inner.rows
                .iter()
                .filter(|c| c.matches(job_id, table, kind))
                .max_by_key(|c| c.created_at)
                .cloned())
    }

    fn list(&self, job_id: Option<&str>) -> Result<Vec<Checkpoint>, CheckpointError> {
        let inner = locks::lock(&self.inner);
        let mut out: Vec<Checkpoint> = inner.rows
                                            .iter()
                                            .filter(|c| job_id.map_or(true, |j| c.job_id == j))
                                            .cloned()
                                            .collect();
        out.sort_by_key(|c| c.created_at);
        Ok(out)
    }

    fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, CheckpointError> {
        let mut inner = locks::lock(&self.inner);
        let before = inner.rows.len();
        inner.rows.retain(|c| c.created_at >= cutoff);
        Ok(before - inner.rows.len())
    }
}
