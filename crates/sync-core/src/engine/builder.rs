//! Builder para `Orchestrator`.
//!
//! Todas las dependencias son opcionales: por defecto se usan stores en
//! memoria y un `RecoverySystem` con su propio `InMemoryCheckpointStore`.
//!
//! ```ignore
//! let orch = Orchestrator::builder()
//!     .config(OrchestratorConfig { max_concurrency: 8, ..Default::default() })
//!     .recovery(Arc::new(RecoverySystem::new(cfg, pg_store)))
//!     .build();
//! ```
use std::sync::Arc;

use super::{Orchestrator, OrchestratorConfig};
use crate::event::{EventStore, InMemoryEventStore};
use crate::recovery::RecoverySystem;
use crate::repo::{InMemoryWorkflowRepository, WorkflowRepository};

#[derive(Default)]
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    workflows: Option<Arc<dyn WorkflowRepository>>,
    events: Option<Arc<dyn EventStore>>,
    recovery: Option<Arc<RecoverySystem>>,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = n;
        self
    }

    pub fn workflows(mut self, repo: Arc<dyn WorkflowRepository>) -> Self {
        self.workflows = Some(repo);
        self
    }

    pub fn event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.events = Some(store);
        self
    }

    pub fn recovery(mut self, recovery: Arc<RecoverySystem>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator::from_parts(self.config,
                                 self.workflows.unwrap_or_else(|| Arc::new(InMemoryWorkflowRepository::new())),
                                 self.events.unwrap_or_else(|| Arc::new(InMemoryEventStore::default())),
                                 self.recovery.unwrap_or_default())
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::builder().build()
    }
}
