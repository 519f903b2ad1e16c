pub mod dag;
pub mod types;

pub use dag::DagIndex;
pub use types::{InMemoryWorkflowRepository, RegisteredWorkflow, WorkflowDefinition, WorkflowRepository};
