use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use sync_domain::ConflictKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    LastWriteWins,
    FirstWriteWins,
    SourcePriority,
    TargetPriority,
    FieldMerge,
    DeepMerge,
    Custom,
    Manual,
    Skip,
}

impl ResolutionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LastWriteWins => "last_write_wins",
            Self::FirstWriteWins => "first_write_wins",
            Self::SourcePriority => "source_priority",
            Self::TargetPriority => "target_priority",
            Self::FieldMerge => "field_merge",
            Self::DeepMerge => "deep_merge",
            Self::Custom => "custom",
            Self::Manual => "manual",
            Self::Skip => "skip",
        }
    }
}

/// Regla por campo para `FieldMerge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldRule {
    #[default]
    SourceWins,
    TargetWins,
    NewerWins,
    /// Numérico: el mayor de los dos.
    Max,
    Min,
    /// Arrays: unión sin duplicados, preservando el orden de `source`.
    Union,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionPolicy {
    pub default_strategy: ResolutionStrategy,
    pub type_overrides: HashMap<ConflictKind, ResolutionStrategy>,
    pub table_overrides: HashMap<String, ResolutionStrategy>,
    pub field_rules: HashMap<String, FieldRule>,
    pub require_validation: bool,
    pub max_attempts: u32,
    /// Conflictos cerrados e historial que el resolutor conserva en memoria.
    #[serde(default = "default_retained")]
    pub retained_conflicts: usize,
}

fn default_retained() -> usize {
    10_000
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self { default_strategy: ResolutionStrategy::LastWriteWins,
               type_overrides: HashMap::from([(ConflictKind::Delete, ResolutionStrategy::Manual)]),
               table_overrides: HashMap::new(),
               field_rules: HashMap::new(),
               require_validation: false,
               max_attempts: 3,
               retained_conflicts: default_retained() }
    }
}

impl ResolutionPolicy {
    pub fn with_default(mut self, strategy: ResolutionStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    pub fn with_table(mut self, table: impl Into<String>, strategy: ResolutionStrategy) -> Self {
        self.table_overrides.insert(table.into(), strategy);
        self
    }

    pub fn with_type(mut self, kind: ConflictKind, strategy: ResolutionStrategy) -> Self {
        self.type_overrides.insert(kind, strategy);
        self
    }

    pub fn with_field_rule(mut self, field: impl Into<String>, rule: FieldRule) -> Self {
        self.field_rules.insert(field.into(), rule);
        self
    }

    pub fn retaining(mut self, conflicts: usize) -> Self {
        self.retained_conflicts = conflicts;
        self
    }

    pub fn requiring_validation(mut self) -> Self {
        self.require_validation = true;
        self
    }

    pub fn field_rule(&self, field: &str) -> FieldRule {
        self.field_rules.get(field).copied().unwrap_or_default()
    }
}
