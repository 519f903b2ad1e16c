//! Error agregado del runtime: envuelve los errores de cada crate.
use sync_adapters::ConnectorError;
use sync_core::{CheckpointError, CoreEngineError, RecoveryError};
use sync_domain::DomainError;
use sync_persistence::PersistenceError;
use sync_policies::ResolverError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Engine(#[from] CoreEngineError),
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error("Error de configuración: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_crate_errors_transparently() {
        let e: SyncError = CoreEngineError::SelfDependency("a".into()).into();
        assert_eq!(e.to_string(), "step 'a' depends on itself");
        let e: SyncError = ConnectorError::UnknownConnector("crm".into()).into();
        assert!(matches!(e, SyncError::Connector(_)));
        assert_eq!(SyncError::Config("x".into()).to_string(), "Error de configuración: x");
    }
}
