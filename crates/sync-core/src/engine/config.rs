use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{DEFAULT_MAX_CONCURRENCY, DEFAULT_STEP_TIMEOUT_SECS};

/// Parámetros del orquestador. Se inyectan al construirlo; ver
/// `OrchestratorBuilder`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Permisos del semáforo que acota los steps en ejecución simultánea.
    pub max_concurrency: usize,
    /// Timeout usado cuando un step declara `timeout_seconds == 0`.
    pub default_step_timeout: Duration,
    /// Crear un checkpoint de job cada N steps completados (0 = sólo en
    /// pausa y al terminar).
    pub checkpoint_every: usize,
    /// Tiempo que una ejecución terminal permanece consultable.
    pub execution_retention: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { max_concurrency: DEFAULT_MAX_CONCURRENCY,
               default_step_timeout: Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS),
               checkpoint_every: 0,
               execution_retention: Duration::from_secs(3600) }
    }
}
