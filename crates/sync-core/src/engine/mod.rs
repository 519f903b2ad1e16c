//! Workflow Orchestrator.
//!
//! Ejecuta workflows DAG de steps tipados con concurrencia acotada,
//! pause/resume/cancel y reintentos dirigidos por el Recovery System.

mod builder;
mod config;
mod driver;
mod execution;
mod orchestrator;

pub use builder::OrchestratorBuilder;
pub use config::OrchestratorConfig;
pub use orchestrator::{Orchestrator, OrchestratorStats, WorkflowSummary};
