use thiserror::Error;
use uuid::Uuid;

use crate::conflict::ConflictStatus;
use crate::policy::ResolutionStrategy;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolverError {
    #[error("conflict {0} not found")]
    UnknownConflict(Uuid),
    #[error("conflict {id} is {status:?}; operation not allowed")]
    InvalidState { id: Uuid, status: ConflictStatus },
    #[error("resolution rejected by validator: {0}")]
    ValidationFailed(String),
    #[error("no custom resolver registered for table '{0}'")]
    CustomResolverMissing(String),
    #[error("custom resolver failed: {0}")]
    CustomFailed(String),
    #[error("strategy {0:?} does not produce a value")]
    NotApplicable(ResolutionStrategy),
}
