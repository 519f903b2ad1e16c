//! `SyncRuntime`: cableado de orquestador, Recovery System, Change Detector,
//! Conflict Resolver y conectores, más la superficie administrativa de
//! consultas (snapshots de sólo lectura).
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use sync_adapters::{Connector, ConnectorRegistry, ExtractHandler, LoadHandler, TransformHandler};
use sync_core::recovery::{CheckpointSummary, ErrorSummary};
use sync_core::{CheckpointStore, InMemoryCheckpointStore, Orchestrator, OrchestratorStats, RecoverySystem, WorkflowDefinition,
                WorkflowResult, WorkflowStep, WorkflowSummary};
use sync_domain::{CacheStats, ChangeDetector};
use sync_persistence::{build_pool, PgCheckpointStore, PoolProvider};
use sync_policies::{Conflict, ConflictResolver, ResolutionHistoryEntry, ResolverStats};

use crate::config::SyncConfig;
use crate::error::SyncError;

/// Snapshot agregado de todos los componentes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStats {
    pub orchestrator: OrchestratorStats,
    pub conflicts: ResolverStats,
    pub comparison_cache: CacheStats,
    pub errors: ErrorSummary,
    pub connectors: Vec<String>,
}

/// Parámetros de un pipeline extract→transform→load estándar.
#[derive(Debug, Clone)]
pub struct EtlSpec {
    pub id: String,
    pub table: String,
    pub source: String,
    pub target: String,
    pub incremental_field: Option<String>,
    pub batch_size: Option<usize>,
}

impl EtlSpec {
    pub fn new(id: impl Into<String>, table: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self { id: id.into(),
               table: table.into(),
               source: source.into(),
               target: target.into(),
               incremental_field: None,
               batch_size: None }
    }

    pub fn incremental(mut self, field: impl Into<String>) -> Self {
        self.incremental_field = Some(field.into());
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = Some(n);
        self
    }

    pub fn definition(&self) -> WorkflowDefinition {
        let mut extract_params = json!({ "connector": self.source });
        if let Some(field) = &self.incremental_field {
            extract_params["incremental_field"] = json!(field);
        }
        if let Some(n) = self.batch_size {
            extract_params["batch_size"] = json!(n);
        }
        let steps = vec![WorkflowStep::new("extract", "extract").with_action(self.table.clone())
                                                                .with_params(extract_params),
                         WorkflowStep::new("transform", "transform").with_action(self.table.clone())
                                                                    .depends_on(["extract"])
                                                                    .with_params(json!({ "target": self.target })),
                         WorkflowStep::new("load", "load").with_action(self.table.clone())
                                                          .depends_on(["transform"])
                                                          .with_params(json!({ "connector": self.target }))];
        WorkflowDefinition::new(self.id.clone(), format!("{} etl", self.table), steps)
    }
}

#[derive(Clone)]
pub struct SyncRuntime {
    orchestrator: Orchestrator,
    recovery: Arc<RecoverySystem>,
    detector: Arc<ChangeDetector>,
    resolver: Arc<ConflictResolver>,
    connectors: Arc<ConnectorRegistry>,
}

impl SyncRuntime {
    /// Runtime con Checkpoint Store en memoria.
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        Self::with_checkpoint_store(config, Arc::new(InMemoryCheckpointStore::new()))
    }

    pub fn with_checkpoint_store(config: SyncConfig, checkpoints: Arc<dyn CheckpointStore>) -> Result<Self, SyncError> {
        let recovery = Arc::new(RecoverySystem::new(config.recovery, checkpoints));
        let detector = Arc::new(ChangeDetector::new(config.detector)?);
        let resolver = Arc::new(ConflictResolver::new(config.resolution));
        let connectors = Arc::new(ConnectorRegistry::new());
        let orchestrator = Orchestrator::builder().config(config.orchestrator)
                                                  .recovery(Arc::clone(&recovery))
                                                  .build();

        orchestrator.register_step_handler("extract",
                                           Arc::new(ExtractHandler::new(Arc::clone(&connectors), Arc::clone(&recovery))));
        orchestrator.register_step_handler("transform",
                                           Arc::new(TransformHandler::new(Arc::clone(&connectors),
                                                                          Arc::clone(&detector),
                                                                          Arc::clone(&resolver))));
        orchestrator.register_step_handler("load", Arc::new(LoadHandler::new(Arc::clone(&connectors), Arc::clone(&recovery))));

        Ok(Self { orchestrator,
                  recovery,
                  detector,
                  resolver,
                  connectors })
    }

    /// Usa Postgres si la configuración trae `database`; si no, memoria.
    pub fn with_postgres(config: SyncConfig) -> Result<Self, SyncError> {
        let Some(db) = config.database.clone() else {
            info!("sin DATABASE_URL: checkpoints en memoria");
            return Self::new(config);
        };
        let pool = build_pool(&db.url, db.min_connections, db.max_connections)?;
        info!("checkpoints en Postgres (pool {}..{})", db.min_connections, db.max_connections);
        Self::with_checkpoint_store(config, Arc::new(PgCheckpointStore::new(PoolProvider::new(pool))))
    }

    pub fn register_connector(&self, connector: Arc<dyn Connector>) {
        self.connectors.register(connector);
    }

    /// Registra el pipeline estándar; devuelve el hash de la definición.
    pub fn register_etl(&self, etl: &EtlSpec) -> Result<String, SyncError> {
        Ok(self.orchestrator.register(etl.definition())?)
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn recovery(&self) -> Arc<RecoverySystem> {
        Arc::clone(&self.recovery)
    }

    pub fn detector(&self) -> Arc<ChangeDetector> {
        Arc::clone(&self.detector)
    }

    pub fn resolver(&self) -> Arc<ConflictResolver> {
        Arc::clone(&self.resolver)
    }

    pub fn connectors(&self) -> Arc<ConnectorRegistry> {
        Arc::clone(&self.connectors)
    }

    // --- superficie administrativa ---

    pub fn list_workflows(&self) -> Vec<WorkflowSummary> {
        self.orchestrator.list_workflows()
    }

    pub fn workflow_status(&self, execution_id: Uuid) -> Result<WorkflowResult, SyncError> {
        Ok(self.orchestrator.status(execution_id)?)
    }

    pub fn conflicts_by_table(&self, table: &str) -> Vec<Conflict> {
        self.resolver.conflicts_by_table(table)
    }

    pub fn pending_conflicts(&self) -> Vec<Conflict> {
        self.resolver.pending_manual()
    }

    /// Historial de resoluciones aplicadas, opcionalmente por tabla.
    pub fn gate_history(&self, table: Option<&str>) -> Vec<ResolutionHistoryEntry> {
        self.resolver.resolution_history(table)
    }

    pub fn error_summary(&self) -> ErrorSummary {
        self.recovery.error_summary()
    }

    pub fn checkpoint_summary(&self) -> Result<CheckpointSummary, SyncError> {
        Ok(self.recovery.checkpoint_summary()?)
    }

    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats { orchestrator: self.orchestrator.stats(),
                       conflicts: self.resolver.stats(),
                       comparison_cache: self.detector.cache_stats(),
                       errors: self.recovery.error_summary(),
                       connectors: self.connectors.names() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etl_definition_chains_three_steps() {
        let def = EtlSpec::new("customers-etl", "customers", "crm", "warehouse").incremental("seq")
                                                                                 .batch_size(50)
                                                                                 .definition();
        assert_eq!(def.len(), 3);
        assert!(def.validate().is_ok());
        let extract = def.step("extract").unwrap();
        assert_eq!(extract.params["incremental_field"], json!("seq"));
        assert_eq!(extract.params["batch_size"], json!(50));
        assert!(def.step("load").unwrap().depends_on.contains("transform"));
    }

    #[test]
    fn new_runtime_registers_standard_handlers() {
        let rt = SyncRuntime::new(SyncConfig::default()).unwrap();
        let stats = rt.stats();
        assert_eq!(stats.orchestrator.registered_handlers, 3);
        assert!(stats.connectors.is_empty());
        assert!(rt.list_workflows().is_empty());
    }
}
