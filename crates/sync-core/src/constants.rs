//! Constantes del motor de sincronización.
//!
//! Valores por defecto compartidos por el orquestador y el Recovery System.
//! `ENGINE_VERSION` se incluye en las posiciones de checkpoint de tipo `job`
//! para detectar checkpoints escritos por una versión incompatible.

/// Versión lógica del motor. Un checkpoint de job con otra versión se ignora
/// al reanudar.
pub const ENGINE_VERSION: &str = "S1.0";

/// Concurrencia máxima por defecto de steps despachados simultáneamente.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Timeout por defecto de un step (segundos).
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 300;

/// Retención por defecto de checkpoints (días).
pub const DEFAULT_CHECKPOINT_RETENTION_DAYS: i64 = 7;

/// Retención por defecto de errores cerrados y acciones ejecutadas (segundos).
pub const DEFAULT_HISTORY_RETENTION_SECS: u64 = 24 * 3600;
