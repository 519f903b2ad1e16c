//! sync-policies: Conflict Resolver.
pub mod conflict;
pub mod custom;
pub mod errors;
pub mod events;
pub mod policy;
pub mod resolver;
pub mod strategies;

pub use conflict::{Conflict, ConflictStatus, ResolutionRecord, ResolvedValue};
pub use custom::{async_resolver, sync_resolver, CustomResolver, ResolutionValidator};
pub use errors::ResolverError;
pub use events::{ConflictEvent, ConflictEventKind};
pub use policy::{FieldRule, ResolutionPolicy, ResolutionStrategy};
pub use resolver::{ConflictCounters, ConflictResolver, ResolutionHistoryEntry, ResolverStats};
