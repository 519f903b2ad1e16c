use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use super::RetryConfig;
use crate::constants::DEFAULT_STEP_TIMEOUT_SECS;

/// Categoría general del step. El tipo concreto (`step_type`) es un string
/// libre usado para buscar el handler registrado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Extract,
    Transform,
    Load,
    Custom,
}

impl StepKind {
    /// Deduce la categoría a partir del tipo registrado.
    pub fn from_type(step_type: &str) -> Self {
        match step_type {
            "extract" => Self::Extract,
            "transform" => Self::Transform,
            "load" => Self::Load,
            _ => Self::Custom,
        }
    }
}

/// Nodo inmutable de un workflow DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Identificador único dentro de la definición.
    pub id: String,
    /// Tipo de step; clave de búsqueda del handler.
    pub step_type: String,
    /// Referencia opcional a la acción concreta (p.ej. nombre de tabla o job
    /// externo). El handler decide cómo interpretarla.
    pub action: Option<String>,
    /// Ids de steps que deben estar `completed` antes de despachar éste.
    pub depends_on: BTreeSet<String>,
    pub timeout_seconds: u64,
    pub retry: RetryConfig,
    /// Parámetros libres entregados al handler.
    pub params: Value,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self { id: id.into(),
               step_type: step_type.into(),
               action: None,
               depends_on: BTreeSet::new(),
               timeout_seconds: DEFAULT_STEP_TIMEOUT_SECS,
               retry: RetryConfig::default(),
               params: Value::Null }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn kind(&self) -> StepKind {
        StepKind::from_type(&self.step_type)
    }
}
