//! sync-persistence
//!
//! Checkpoint Store durable sobre Postgres (Diesel + r2d2) con la misma
//! semántica que el store en memoria de `sync-core`: append-only, fecha de
//! creación monótona por (job, tabla, tipo) y poda por retención.
//!
//! Módulos:
//! - `pg`: pool, proveedor de conexiones y `PgCheckpointStore`.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgCheckpointStore, PgPool, PoolProvider};
