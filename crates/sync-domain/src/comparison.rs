//! Tipos de salida del detector y su configuración.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crate::record::FieldChange;

/// Estrategia de comparación, seleccionable por tabla.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStrategy {
    FieldLevel,
    HashBased,
    TimestampBased,
    VersionBased,
    Checksum,
}

impl ComparisonStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FieldLevel => "field_level",
            Self::HashBased => "hash_based",
            Self::TimestampBased => "timestamp_based",
            Self::VersionBased => "version_based",
            Self::Checksum => "checksum",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Delete,
    Version,
    Content,
    Schema,
}

impl ConflictKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Version => "version",
            Self::Content => "content",
            Self::Schema => "schema",
        }
    }
}

/// Conflicto detectado entre dos versiones. Simétrico: no depende del orden
/// en que se pasan los registros.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedConflict {
    pub kind: ConflictKind,
    pub record_id: String,
    /// Campos involucrados, ordenados.
    pub fields: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub equal: bool,
    /// `[0, 1]`: campos coincidentes sobre campos totales.
    pub similarity: f64,
    pub changes: Vec<FieldChange>,
    pub conflicts: Vec<DetectedConflict>,
    pub confidence: f64,
    pub strategy: ComparisonStrategy,
}

impl ComparisonResult {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Conflicto de mayor prioridad (delete > version > content > schema).
    pub fn primary_conflict(&self) -> Option<&DetectedConflict> {
        self.conflicts.iter().min_by_key(|c| c.kind)
    }

    pub fn changed_fields(&self) -> Vec<&str> {
        self.changes.iter().map(|c| c.field.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub default_strategy: ComparisonStrategy,
    pub table_strategies: HashMap<String, ComparisonStrategy>,
    /// Campos fuera de toda comparación (marcas técnicas).
    pub ignore_fields: BTreeSet<String>,
    /// Campo del payload con el timestamp de modificación; si falta se usa
    /// `DataVersion::timestamp`.
    pub timestamp_field: Option<String>,
    pub timestamp_tolerance: Duration,
    /// Campo del payload con la versión; si falta se usa
    /// `DataVersion::version`.
    pub version_field: Option<String>,
    /// Campos hasheados por `HashBased`, por tabla. Vacío = todos.
    pub hash_fields: HashMap<String, Vec<String>>,
    /// Dos ediciones con timestamps más cercanos que esto y valores
    /// distintos son una edición concurrente.
    pub concurrent_update_tolerance: Duration,
    pub cache_capacity: usize,
    pub detection_workers: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self { default_strategy: ComparisonStrategy::FieldLevel,
               table_strategies: HashMap::new(),
               ignore_fields: BTreeSet::new(),
               timestamp_field: None,
               timestamp_tolerance: Duration::from_secs(1),
               version_field: None,
               hash_fields: HashMap::new(),
               concurrent_update_tolerance: Duration::from_secs(5),
               cache_capacity: 1024,
               detection_workers: 4 }
    }
}

impl DetectorConfig {
    pub fn strategy_for(&self, table: Option<&str>) -> ComparisonStrategy {
        table.and_then(|t| self.table_strategies.get(t).copied())
             .unwrap_or(self.default_strategy)
    }
}
