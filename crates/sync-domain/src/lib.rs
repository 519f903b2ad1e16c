//! sync-domain: modelo de registros y Change Detector.
pub mod cache;
pub mod comparison;
pub mod detector;
pub mod errors;
pub mod record;

pub use cache::CacheStats;
pub use comparison::{ComparisonResult, ComparisonStrategy, ConflictKind, DetectedConflict, DetectorConfig};
pub use detector::ChangeDetector;
pub use errors::DomainError;
pub use record::{ChangeKind, ChangeRecord, DataVersion, FieldChange};
