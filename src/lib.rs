//! syncflow
//!
//! Runtime de sincronización de datos sobre los crates del workspace:
//! - `config`: `SyncConfig` desde variables de entorno (.env) y `CONFIG` global.
//! - `error`: `SyncError`, agregado de los errores de cada crate.
//! - `runtime`: `SyncRuntime` (cableado + consultas administrativas).

pub mod config;
pub mod error;
pub mod runtime;

pub use config::{DatabaseConfig, SyncConfig, CONFIG};
pub use error::SyncError;
pub use runtime::{EtlSpec, RuntimeStats, SyncRuntime};

pub use sync_adapters as adapters;
pub use sync_core as core;
pub use sync_domain as domain;
pub use sync_policies as policies;
