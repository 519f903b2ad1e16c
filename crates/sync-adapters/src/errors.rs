use sync_core::StepError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    #[error("connector '{0}' unavailable: {1}")]
    Unavailable(String, String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("connector '{0}' not registered")]
    UnknownConnector(String),
    #[error("invalid step parameters: {0}")]
    InvalidParams(String),
}

/// Traducción al error declarado de step; el `kind` guía la clasificación
/// del Recovery System.
impl From<ConnectorError> for StepError {
    fn from(err: ConnectorError) -> Self {
        match &err {
            ConnectorError::Unavailable(..) | ConnectorError::Fetch(_) | ConnectorError::Write(_) => {
                StepError::connection(err.to_string())
            }
            ConnectorError::UnknownConnector(_) | ConnectorError::InvalidParams(_) => StepError::validation(err.to_string()),
        }
    }
}
