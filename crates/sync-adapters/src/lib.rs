//! sync-adapters: contrato de conectores y handlers estándar.
//!
//! - `connector`: `Connector` (fetch/write/test_connection) y su registro.
//! - `memory`: conector en memoria.
//! - `steps`: `extract`, `transform`, `load`, que combinan conectores,
//!   Change Detector, Conflict Resolver y checkpoints de tabla.

pub mod connector;
pub mod errors;
pub mod memory;
pub mod steps;

pub use connector::{Batch, Connector, ConnectorRegistry, FetchRequest, SyncResult, WriteMode};
pub use errors::ConnectorError;
pub use memory::InMemoryConnector;
pub use steps::{ExtractHandler, LoadHandler, TransformHandler};
