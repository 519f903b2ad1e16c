//! `Orchestrator`: registro de workflows y handlers, ciclo de vida de
//! ejecuciones y consultas.
//!
//! Rol en el flujo:
//! - `register` valida el DAG y lo guarda (reemplazando por id).
//! - `execute` / `execute_job` crean la ejecución y lanzan su driver; el
//!   driver despacha steps acotados por un semáforo compartido por todas las
//!   ejecuciones de esta instancia.
//! - `pause` / `resume` / `cancel` mutan el estado bajo el lock de la
//!   ejecución y despiertan al driver.
use dashmap::DashMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::driver::{self, create_job_checkpoint};
use super::execution::ExecutionHandle;
use super::OrchestratorConfig;
use crate::errors::CoreEngineError;
use crate::event::{EventBus, EventListener, EventStore, FlowEvent, FlowEventKind, ListenerId};
use crate::model::{WorkflowResult, WorkflowStatus};
use crate::recovery::{CheckpointKind, RecoverySystem};
use crate::repo::{RegisteredWorkflow, WorkflowDefinition, WorkflowRepository};
use crate::step::{StepHandler, StepStatus};

pub(crate) struct Inner {
    pub config: OrchestratorConfig,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub handlers: DashMap<String, Arc<dyn StepHandler>>,
    pub executions: DashMap<Uuid, Arc<ExecutionHandle>>,
    pub recovery: Arc<RecoverySystem>,
    pub events: Arc<dyn EventStore>,
    pub bus: EventBus<FlowEvent>,
    pub permits: Arc<Semaphore>,
}

impl Inner {
    /// Append al log de la ejecución y entrega a los listeners.
    pub fn emit(&self, flow_id: Uuid, kind: FlowEventKind) {
        let ev = self.events.append_kind(flow_id, kind);
        self.bus.emit(&ev);
    }
}

/// Resumen de una definición registrada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub step_count: usize,
    pub definition_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorStats {
    pub registered_workflows: usize,
    pub registered_handlers: usize,
    pub tracked_executions: usize,
    pub executions_by_status: BTreeMap<String, usize>,
    pub steps_by_status: BTreeMap<String, usize>,
    pub records_processed: u64,
    pub total_retries: u64,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub(super) fn from_parts(config: OrchestratorConfig,
                             workflows: Arc<dyn WorkflowRepository>,
                             events: Arc<dyn EventStore>,
                             recovery: Arc<RecoverySystem>)
                             -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self { inner: Arc::new(Inner { config,
                                       workflows,
                                       handlers: DashMap::new(),
                                       executions: DashMap::new(),
                                       recovery,
                                       events,
                                       bus: EventBus::new(),
                                       permits }) }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn recovery(&self) -> Arc<RecoverySystem> {
        Arc::clone(&self.inner.recovery)
    }

    /// Valida y registra; devuelve el hash de la definición.
    pub fn register(&self, definition: WorkflowDefinition) -> Result<String, CoreEngineError> {
        let id = definition.id.clone();
        let registered = self.inner.workflows.register(definition).map_err(|e| {
                                                                       warn!("rejected workflow '{id}': {e}");
                                                                       e
                                                                   })?;
        info!("registered workflow '{id}' ({} steps)", registered.definition.len());
        Ok(registered.definition_hash.clone())
    }

    pub fn register_step_handler(&self, step_type: impl Into<String>, handler: Arc<dyn StepHandler>) {
        self.inner.handlers.insert(step_type.into(), handler);
    }

    pub fn list_workflows(&self) -> Vec<WorkflowSummary> {
        self.inner
            .workflows
            .list()
            .iter()
            .map(|w| WorkflowSummary { id: w.definition.id.clone(),
                                       name: w.definition.name.clone(),
                                       step_count: w.definition.len(),
                                       definition_hash: w.definition_hash.clone() })
            .collect()
    }

    pub fn workflow(&self, id: &str) -> Option<WorkflowDefinition> {
        self.inner.workflows.get(id).map(|w| w.definition.clone())
    }

    /// Lanza una ejecución nueva y devuelve su id sin esperar. El job id es
    /// el propio id de ejecución.
    pub fn execute(&self, workflow_id: &str, input: Value) -> Result<Uuid, CoreEngineError> {
        self.start(workflow_id, None, input)
    }

    /// Como `execute`, pero bajo un job id estable: los steps registrados
    /// como completados en el último checkpoint `job` compatible se
    /// restauran con sus outputs y no se vuelven a despachar.
    pub fn execute_job(&self, workflow_id: &str, job_id: &str, input: Value) -> Result<Uuid, CoreEngineError> {
        self.start(workflow_id, Some(job_id), input)
    }

    /// Forma bloqueante: ejecuta y espera el estado terminal.
    pub async fn execute_and_wait(&self, workflow_id: &str, input: Value) -> Result<WorkflowResult, CoreEngineError> {
        let id = self.execute(workflow_id, input)?;
        self.wait(id).await
    }

    fn start(&self, workflow_id: &str, job_id: Option<&str>, input: Value) -> Result<Uuid, CoreEngineError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
                                                                CoreEngineError::Internal("execute requires a tokio runtime".into())
                                                            })?;
        let workflow = self.inner
                           .workflows
                           .get(workflow_id)
                           .ok_or_else(|| CoreEngineError::UnknownWorkflow(workflow_id.to_string()))?;
        if let Some(missing) = workflow.definition
                                       .steps
                                       .iter()
                                       .find(|s| !self.inner.handlers.contains_key(&s.step_type))
        {
            return Err(CoreEngineError::NoHandler(missing.step_type.clone()));
        }

        let id = Uuid::new_v4();
        let restored = match job_id {
            Some(job) => self.restore_job(&workflow, job),
            None => Default::default(),
        };
        let job_id = job_id.map(str::to_string).unwrap_or_else(|| id.to_string());
        let exec = Arc::new(ExecutionHandle::new(id, Arc::clone(&workflow), job_id, input));
        let resumed_steps = restored.len();
        exec.update(|st| {
                for step in st.result.steps.iter_mut() {
                    if let Some((output, records)) = restored.get(&step.step_id) {
                        step.status = StepStatus::Completed;
                        step.output = Some(output.clone());
                        step.records_processed = *records;
                    }
                }
                st.result.status = WorkflowStatus::Running;
            });
        self.inner.executions.insert(id, Arc::clone(&exec));
        self.inner.emit(id,
                        FlowEventKind::WorkflowStarted { workflow_id: workflow.definition.id.clone(),
                                                         step_count: workflow.definition.len(),
                                                         resumed_steps });
        info!("execution {id} of '{}' started (job '{}', {resumed_steps} steps restored)",
              workflow.definition.id,
              exec.job_id);
        runtime.spawn(driver::drive(Arc::clone(&self.inner), exec));
        Ok(id)
    }

    fn restore_job(&self, workflow: &RegisteredWorkflow, job_id: &str) -> std::collections::HashMap<String, (Value, u64)> {
        match self.inner
                  .recovery
                  .find_latest_checkpoint(job_id, None, Some(CheckpointKind::Job))
        {
            Ok(Some(cp)) => {
                let restored = driver::restored_steps(&cp.position, &workflow.definition.id, &workflow.definition_hash);
                if restored.is_empty() {
                    info!("job '{job_id}': checkpoint {} not reusable, starting fresh", cp.id);
                }
                restored
            }
            Ok(None) => Default::default(),
            Err(e) => {
                warn!("job '{job_id}': checkpoint lookup failed ({e}), starting fresh");
                Default::default()
            }
        }
    }

    fn handle(&self, id: Uuid) -> Result<Arc<ExecutionHandle>, CoreEngineError> {
        self.inner
            .executions
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(CoreEngineError::UnknownExecution(id))
    }

    /// Espera a que la ejecución llegue a un estado terminal.
    pub async fn wait(&self, id: Uuid) -> Result<WorkflowResult, CoreEngineError> {
        let exec = self.handle(id)?;
        exec.wait_done().await;
        Ok(exec.snapshot())
    }

    pub fn status(&self, id: Uuid) -> Result<WorkflowResult, CoreEngineError> {
        Ok(self.handle(id)?.snapshot())
    }

    pub fn list_executions(&self) -> Vec<WorkflowResult> {
        let mut all: Vec<WorkflowResult> = self.inner.executions.iter().map(|e| e.value().snapshot()).collect();
        all.sort_by_key(|r| r.started_at);
        all
    }

    /// Detiene el despacho de steps nuevos; los que están en vuelo terminan.
    pub fn pause(&self, id: Uuid) -> Result<(), CoreEngineError> {
        let exec = self.handle(id)?;
        exec.update(|st| {
                if st.result.status.is_terminal() || st.cancel_requested {
                    return Err(CoreEngineError::ExecutionTerminal(id));
                }
                if st.paused {
                    return Err(CoreEngineError::InvalidTransition { id,
                                                                    from: "paused".into(),
                                                                    to: "paused".into() });
                }
                st.paused = true;
                st.result.status = WorkflowStatus::Paused;
                Ok(())
            })?;
        exec.wake.notify_one();
        info!("execution {id} paused");
        self.inner.emit(id, FlowEventKind::WorkflowPaused);
        create_job_checkpoint(&self.inner, &exec);
        Ok(())
    }

    /// Reanuda el despacho desde la frontera de dependencias actual.
    pub fn resume(&self, id: Uuid) -> Result<(), CoreEngineError> {
        let exec = self.handle(id)?;
        exec.update(|st| {
                if st.result.status.is_terminal() || st.cancel_requested {
                    return Err(CoreEngineError::ExecutionTerminal(id));
                }
                if !st.paused {
                    return Err(CoreEngineError::InvalidTransition { id,
                                                                    from: st.result.status.as_str().into(),
                                                                    to: "running".into() });
                }
                st.paused = false;
                st.result.status = WorkflowStatus::Running;
                Ok(())
            })?;
        exec.wake.notify_one();
        info!("execution {id} resumed");
        self.inner.emit(id, FlowEventKind::WorkflowResumed);
        Ok(())
    }

    /// Corta el despacho y pide cancelación cooperativa a los steps en vuelo.
    pub fn cancel(&self, id: Uuid) -> Result<(), CoreEngineError> {
        let exec = self.handle(id)?;
        exec.update(|st| {
                if st.result.status.is_terminal() {
                    return Err(CoreEngineError::ExecutionTerminal(id));
                }
                if st.cancel_requested {
                    return Err(CoreEngineError::InvalidTransition { id,
                                                                    from: "cancelling".into(),
                                                                    to: "cancelled".into() });
                }
                st.cancel_requested = true;
                st.paused = false;
                Ok(())
            })?;
        exec.signal_cancel();
        exec.wake.notify_one();
        info!("execution {id} cancellation requested");
        Ok(())
    }

    /// Historial append-only de eventos de una ejecución.
    pub fn events_for(&self, id: Uuid) -> Vec<FlowEvent> {
        self.inner.events.list(id)
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener<FlowEvent>>) -> ListenerId {
        self.inner.bus.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.bus.unsubscribe(id)
    }

    pub fn stats(&self) -> OrchestratorStats {
        let mut stats = OrchestratorStats { registered_workflows: self.inner.workflows.list().len(),
                                            registered_handlers: self.inner.handlers.len(),
                                            ..Default::default() };
        for result in self.list_executions() {
            stats.tracked_executions += 1;
            *stats.executions_by_status.entry(result.status.as_str().to_string()).or_default() += 1;
            for s in &result.steps {
                *stats.steps_by_status.entry(s.status.as_str().to_string()).or_default() += 1;
            }
            stats.records_processed += result.records_processed();
            stats.total_retries += u64::from(result.total_retries());
        }
        stats
    }
}
