//! Estado vivo de una ejecución.
//!
//! El `WorkflowResult` y los flags de control (pausa, cancelación) comparten
//! un único mutex. Ninguna operación toma otro lock mientras lo tiene.
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Notify};
use uuid::Uuid;

use crate::locks;
use crate::model::{CancelSignal, ExecutionContext, StepResult, WorkflowResult, WorkflowStatus};
use crate::repo::RegisteredWorkflow;
use crate::step::StepStatus;

pub(crate) struct ExecutionState {
    pub result: WorkflowResult,
    pub paused: bool,
    pub cancel_requested: bool,
}

impl ExecutionState {
    pub fn all_terminal(&self) -> bool {
        self.result.steps.iter().all(|s| s.status.is_terminal())
    }
}

pub(crate) struct ExecutionHandle {
    pub id: Uuid,
    pub workflow: Arc<RegisteredWorkflow>,
    pub job_id: String,
    pub input: Value,
    index: HashMap<String, usize>,
    state: Mutex<ExecutionState>,
    cancel_tx: watch::Sender<bool>,
    done_tx: watch::Sender<bool>,
    /// Despierta al driver tras pause/resume/cancel.
    pub wake: Notify,
}

impl ExecutionHandle {
    pub fn new(id: Uuid, workflow: Arc<RegisteredWorkflow>, job_id: String, input: Value) -> Self {
        let steps: Vec<StepResult> = workflow.definition.steps.iter().map(|s| StepResult::pending(&s.id)).collect();
        let index = steps.iter().enumerate().map(|(i, s)| (s.step_id.clone(), i)).collect();
        let result = WorkflowResult { execution_id: id,
                                      workflow_id: workflow.definition.id.clone(),
                                      job_id: job_id.clone(),
                                      status: WorkflowStatus::Pending,
                                      steps,
                                      errors: Vec::new(),
                                      started_at: Utc::now(),
                                      finished_at: None };
        let (cancel_tx, _) = watch::channel(false);
        let (done_tx, _) = watch::channel(false);
        Self { id,
               workflow,
               job_id,
               input,
               index,
               state: Mutex::new(ExecutionState { result,
                                                  paused: false,
                                                  cancel_requested: false }),
               cancel_tx,
               done_tx,
               wake: Notify::new() }
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut ExecutionState) -> R) -> R {
        f(&mut locks::lock(&self.state))
    }

    /// Muta sólo el `StepResult` de `step_id`.
    pub fn update_step<R>(&self, step_id: &str, f: impl FnOnce(&mut StepResult) -> R) -> Option<R> {
        let idx = *self.index.get(step_id)?;
        let mut st = locks::lock(&self.state);
        st.result.steps.get_mut(idx).map(f)
    }

    pub fn step_status(&self, step_id: &str) -> Option<StepStatus> {
        let idx = *self.index.get(step_id)?;
        locks::lock(&self.state).result.steps.get(idx).map(|s| s.status)
    }

    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.index.get(step_id).copied()
    }

    pub fn snapshot(&self) -> WorkflowResult {
        locks::lock(&self.state).result.clone()
    }

    pub fn signal_cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn mark_done(&self) {
        self.done_tx.send_replace(true);
    }

    pub async fn wait_done(&self) {
        let mut rx = self.done_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Contexto para un step: outputs de sus ancestros completados.
    pub fn context_for(&self, step_id: &str, st: &ExecutionState) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(self.id,
                                            self.workflow.definition.id.clone(),
                                            self.job_id.clone(),
                                            self.input.clone(),
                                            CancelSignal::new(self.cancel_tx.subscribe()));
        for anc in self.workflow.dag.ancestors(step_id) {
            let Some(idx) = self.index.get(anc.as_str()) else { continue };
            let res = &st.result.steps[*idx];
            if res.status == StepStatus::Completed {
                if let Some(out) = &res.output {
                    ctx.outputs.insert(anc.clone(), out.clone());
                }
            }
        }
        ctx
    }
}
