//! Loop de ejecución de un workflow.
//!
//! Un driver por ejecución libera steps en orden topológico: un step es
//! elegible cuando todas sus dependencias están `completed`. Cada step
//! despachado corre en su propia tarea, que toma un permiso del semáforo
//! global por intento, aplica el timeout y consulta al Recovery System ante
//! cada error. Las dependencias de un step fallido u omitido nunca se
//! despachan: quedan `skipped` ("blocked by").
use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::orchestrator::Inner;
use super::execution::{ExecutionHandle, ExecutionState};
use crate::constants::ENGINE_VERSION;
use crate::errors::StepError;
use crate::event::FlowEventKind;
use crate::hashing::hash_value;
use crate::model::{ExecutionContext, ExecutionError, WorkflowStatus};
use crate::recovery::{ActionOutcome, BackoffKind, BackoffPolicy, CheckpointKind, ErrorContext, RecoveryStrategy};
use crate::step::{saturating_millis, StepHandler, StepOutput, StepStatus, WorkflowStep};

struct Dispatch {
    step: WorkflowStep,
    ctx: ExecutionContext,
}

/// Resultado de una pasada de planificación bajo el lock.
#[derive(Default)]
struct Plan {
    ready: Vec<Dispatch>,
    blocked: Vec<(String, String)>,
}

enum Terminal {
    Completed(StepOutput),
    Failed { error_type: String, message: String },
    Skipped { error_type: String, message: String },
    Cancelled,
}

pub(super) async fn drive(inner: Arc<Inner>, exec: Arc<ExecutionHandle>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let mut running = 0usize;
    let mut since_checkpoint = 0usize;

    loop {
        let plan = exec.update(|st| plan_round(&exec, st));
        for (step_id, reason) in plan.blocked {
            inner.emit(exec.id, FlowEventKind::StepSkipped { step_id, reason });
        }
        for Dispatch { step, ctx } in plan.ready {
            let Some(handler) = inner.handlers.get(&step.step_type).map(|h| Arc::clone(h.value())) else {
                // Validado en execute(); un handler desregistrado después cae aquí.
                fail_without_running(&inner, &exec, &step, &tx);
                running += 1;
                continue;
            };
            debug!("dispatching step '{}' of {}", step.id, exec.id);
            running += 1;
            tokio::spawn(run_step(Arc::clone(&inner), Arc::clone(&exec), step, handler, ctx, tx.clone()));
        }

        if running == 0 {
            let (all_terminal, paused, cancel) =
                exec.update(|st| (st.all_terminal(), st.paused, st.cancel_requested));
            if all_terminal || cancel {
                break;
            }
            if paused {
                exec.wake.notified().await;
                continue;
            }
            // Nada elegible ni en vuelo: sólo puede quedar trabajo bloqueado.
            break;
        }

        tokio::select! {
            Some(step_id) = rx.recv() => {
                running -= 1;
                if exec.step_status(&step_id) == Some(StepStatus::Completed) {
                    since_checkpoint += 1;
                    if inner.config.checkpoint_every > 0 && since_checkpoint >= inner.config.checkpoint_every {
                        since_checkpoint = 0;
                        create_job_checkpoint(&inner, &exec);
                    }
                }
            }
            _ = exec.wake.notified() => {}
        }
    }

    finalize(&inner, &exec);
}

fn plan_round(exec: &ExecutionHandle, st: &mut ExecutionState) -> Plan {
    let mut plan = Plan::default();
    let dag = &exec.workflow.dag;
    for step_id in &dag.topo_order {
        let Some(idx) = exec.step_index(step_id) else { continue };
        if st.result.steps[idx].status != StepStatus::Pending {
            continue;
        }
        if st.cancel_requested {
            let res = &mut st.result.steps[idx];
            res.status = StepStatus::Cancelled;
            res.finished_at = Some(Utc::now());
            continue;
        }
        let Some(step) = exec.workflow.definition.step(step_id) else { continue };
        let mut blocker = None;
        let mut all_done = true;
        for dep in &step.depends_on {
            match exec.step_index(dep).map(|i| st.result.steps[i].status) {
                Some(StepStatus::Completed) => {}
                Some(StepStatus::Failed | StepStatus::Skipped | StepStatus::Cancelled) => {
                    blocker = Some(dep.clone());
                    break;
                }
                _ => all_done = false,
            }
        }
        if let Some(dep) = blocker {
            let reason = format!("blocked by '{dep}'");
            let res = &mut st.result.steps[idx];
            res.status = StepStatus::Skipped;
            res.error = Some(reason.clone());
            res.finished_at = Some(Utc::now());
            plan.blocked.push((step_id.clone(), reason));
            continue;
        }
        if st.paused || !all_done {
            continue;
        }
        let ctx = exec.context_for(step_id, st);
        let res = &mut st.result.steps[idx];
        res.status = StepStatus::Running;
        res.started_at = Some(Utc::now());
        plan.ready.push(Dispatch { step: step.clone(), ctx });
    }
    plan
}

fn fail_without_running(inner: &Inner, exec: &ExecutionHandle, step: &WorkflowStep, tx: &mpsc::UnboundedSender<String>) {
    let message = format!("no handler registered for step type '{}'", step.step_type);
    apply_terminal(inner,
                   exec,
                   &step.id,
                   Terminal::Failed { error_type: "no_handler".into(),
                                      message });
    let _ = tx.send(step.id.clone());
}

async fn run_step(inner: Arc<Inner>,
                  exec: Arc<ExecutionHandle>,
                  step: WorkflowStep,
                  handler: Arc<dyn StepHandler>,
                  mut ctx: ExecutionContext,
                  tx: mpsc::UnboundedSender<String>) {
    let timeout = if step.timeout_seconds == 0 {
        inner.config.default_step_timeout
    } else {
        Duration::from_secs(step.timeout_seconds)
    };
    let mut retry_count = 0u32;
    let mut error_ids: Vec<Uuid> = Vec::new();
    let mut action_ids: Vec<Uuid> = Vec::new();

    let terminal = loop {
        if ctx.is_cancelled() {
            break Terminal::Cancelled;
        }
        let permit = tokio::select! {
            p = Arc::clone(&inner.permits).acquire_owned() => p,
            _ = ctx.cancelled() => break Terminal::Cancelled,
        };
        let Ok(permit) = permit else {
            break Terminal::Failed { error_type: "internal".into(),
                                     message: "worker pool closed".into() };
        };
        inner.emit(exec.id,
                   FlowEventKind::StepStarted { step_id: step.id.clone(),
                                                attempt: retry_count });
        ctx.attempt = retry_count;
        let outcome = match tokio::time::timeout(timeout, handler.handle(&step, &ctx)).await {
            Ok(r) => r,
            Err(_) => Err(StepError::timeout(format!("step '{}' exceeded {}s", step.id, timeout.as_secs()))),
        };
        drop(permit);

        let err = match outcome {
            Ok(out) => break Terminal::Completed(out),
            Err(e) if e.is_cancellation() || ctx.is_cancelled() => break Terminal::Cancelled,
            Err(e) => e,
        };

        let rctx = ErrorContext::new(exec.job_id.clone(), step.id.clone())
            .with_retry_count(retry_count)
            .with_details(json!({
                "execution_id": exec.id,
                "workflow_id": exec.workflow.definition.id,
                "step_type": step.step_type,
            }));
        let action = inner.recovery.handle_error(&err, rctx);
        error_ids.push(action.error_id);
        action_ids.push(action.id);
        let error_type = action.error_type().to_string();
        let backoff = match action.strategy {
            RecoveryStrategy::ExponentialBackoff => BackoffPolicy::for_step(BackoffKind::Exponential, &step.retry),
            RecoveryStrategy::LinearBackoff => BackoffPolicy::for_step(BackoffKind::Linear, &step.retry),
            RecoveryStrategy::SkipAndContinue => {
                break Terminal::Skipped { error_type,
                                          message: err.message };
            }
            RecoveryStrategy::ManualIntervention | RecoveryStrategy::CircuitBreaker => None,
        };
        let Some(policy) = backoff else {
            inner.recovery.settle_actions(&[action.id], &ActionOutcome::Deferred);
            break Terminal::Failed { error_type,
                                     message: err.message };
        };
        match policy.delay_for(retry_count) {
            Ok(delay) => {
                retry_count += 1;
                exec.update_step(&step.id, |r| r.retry_count = retry_count);
                warn!("step '{}' failed ({err}); retry {retry_count} in {delay:?} via {}",
                      step.id,
                      action.strategy.as_str());
                inner.emit(exec.id,
                           FlowEventKind::StepRetrying { step_id: step.id.clone(),
                                                         attempt: retry_count,
                                                         delay_ms: saturating_millis(delay),
                                                         strategy: action.strategy.as_str().to_string() });
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = ctx.cancelled() => break Terminal::Cancelled,
                }
            }
            Err(exhausted) => {
                inner.recovery.record_exhausted(action.id, &exhausted.to_string());
                break Terminal::Failed { error_type,
                                         message: err.message };
            }
        }
    };

    if matches!(terminal, Terminal::Completed(_)) {
        for id in error_ids {
            let _ = inner.recovery.mark_resolved(id);
        }
    }
    let settled = match &terminal {
        Terminal::Completed(_) => ActionOutcome::Succeeded,
        Terminal::Skipped { .. } => ActionOutcome::Skipped,
        Terminal::Failed { message, .. } => ActionOutcome::Exhausted(message.clone()),
        Terminal::Cancelled => ActionOutcome::Deferred,
    };
    inner.recovery.settle_actions(&action_ids, &settled);
    apply_terminal(&inner, &exec, &step.id, terminal);
    let _ = tx.send(step.id);
}

fn apply_terminal(inner: &Inner, exec: &ExecutionHandle, step_id: &str, terminal: Terminal) {
    let now = Some(Utc::now());
    let event = match terminal {
        Terminal::Completed(out) => {
            let output_hash = hash_value(&out.data);
            exec.update_step(step_id, |r| {
                    r.status = StepStatus::Completed;
                    r.error = None;
                    r.records_processed = out.records_processed;
                    r.output = Some(out.data);
                    r.finished_at = now;
                });
            FlowEventKind::StepCompleted { step_id: step_id.to_string(),
                                           records_processed: out.records_processed,
                                           output_hash }
        }
        Terminal::Failed { error_type, message } => {
            error!("step '{step_id}' of {} failed permanently: {error_type}: {message}", exec.id);
            record_failure(exec, step_id, StepStatus::Failed, &error_type, &message);
            FlowEventKind::StepFailed { step_id: step_id.to_string(),
                                        error_type,
                                        message }
        }
        Terminal::Skipped { error_type, message } => {
            record_failure(exec, step_id, StepStatus::Skipped, &error_type, &message);
            FlowEventKind::StepSkipped { step_id: step_id.to_string(),
                                         reason: format!("{error_type}: {message}") }
        }
        Terminal::Cancelled => {
            exec.update_step(step_id, |r| {
                    r.status = StepStatus::Cancelled;
                    r.finished_at = now;
                });
            return;
        }
    };
    inner.emit(exec.id, event);
}

fn record_failure(exec: &ExecutionHandle, step_id: &str, status: StepStatus, error_type: &str, message: &str) {
    exec.update(|st| {
            if let Some(idx) = exec.step_index(step_id) {
                let r = &mut st.result.steps[idx];
                r.status = status;
                r.error = Some(format!("{error_type}: {message}"));
                r.finished_at = Some(Utc::now());
            }
            st.result.errors.push(ExecutionError { step_id: step_id.to_string(),
                                                   error_type: error_type.to_string(),
                                                   message: message.to_string() });
        });
}

/// Estado terminal de una ejecución no cancelada con algún step sin
/// completar: `partial` si algún step completado no es ancestro de ningún
/// step fallido u omitido (una rama independiente terminó), si no `failed`.
fn terminal_status(exec: &ExecutionHandle, st: &ExecutionState) -> WorkflowStatus {
    if st.cancel_requested {
        return WorkflowStatus::Cancelled;
    }
    let steps = &st.result.steps;
    if steps.iter().all(|s| s.status == StepStatus::Completed) {
        return WorkflowStatus::Completed;
    }
    let dag = &exec.workflow.dag;
    let feeding_failures: BTreeSet<&String> =
        steps.iter()
             .filter(|s| matches!(s.status, StepStatus::Failed | StepStatus::Skipped))
             .flat_map(|s| dag.ancestors(&s.step_id))
             .collect();
    let independent_success = steps.iter()
                                   .any(|s| s.status == StepStatus::Completed && !feeding_failures.contains(&s.step_id));
    if independent_success {
        WorkflowStatus::Partial
    } else {
        WorkflowStatus::Failed
    }
}

fn finalize(inner: &Arc<Inner>, exec: &Arc<ExecutionHandle>) {
    let (status, failed_steps) = exec.update(|st| {
                                         let status = terminal_status(exec, st);
                                         st.result.status = status;
                                         st.result.finished_at = Some(Utc::now());
                                         st.paused = false;
                                         let failed: Vec<String> =
                                             st.result
                                               .steps
                                               .iter()
                                               .filter(|s| matches!(s.status, StepStatus::Failed | StepStatus::Skipped))
                                               .map(|s| s.step_id.clone())
                                               .collect();
                                         (status, failed)
                                     });
    create_job_checkpoint(inner, exec);
    let kind = match status {
        WorkflowStatus::Completed => FlowEventKind::WorkflowCompleted,
        WorkflowStatus::Cancelled => FlowEventKind::WorkflowCancelled,
        WorkflowStatus::Partial => FlowEventKind::WorkflowPartial { failed_steps },
        _ => FlowEventKind::WorkflowFailed { failed_steps },
    };
    info!("execution {} of '{}' finished: {}",
          exec.id,
          exec.workflow.definition.id,
          status.as_str());
    inner.emit(exec.id, kind);
    exec.mark_done();
    schedule_eviction(inner, exec.id);
}

fn schedule_eviction(inner: &Arc<Inner>, id: Uuid) {
    let weak = Arc::downgrade(inner);
    let retention = inner.config.execution_retention;
    tokio::spawn(async move {
        tokio::time::sleep(retention).await;
        if let Some(inner) = weak.upgrade() {
            inner.executions.remove(&id);
            inner.events.forget(id);
            debug!("evicted execution {id}");
        }
    });
}

/// Checkpoint `job` con los steps completados y sus outputs. Un job que
/// terminó `completed` queda marcado `finished`: la siguiente ejecución del
/// mismo job es una pasada nueva, no una reanudación.
pub(super) fn create_job_checkpoint(inner: &Inner, exec: &ExecutionHandle) {
    let (completed, count, finished) = exec.update(|st| {
                                         let mut map = Map::new();
                                         for s in st.result.steps.iter().filter(|s| s.status == StepStatus::Completed) {
                                             map.insert(s.step_id.clone(),
                                                        json!({
                                                            "output": s.output.clone().unwrap_or(Value::Null),
                                                            "records_processed": s.records_processed,
                                                        }));
                                         }
                                         let n = map.len();
                                         (map, n, st.result.status == WorkflowStatus::Completed)
                                     });
    let position = json!({
        "engine_version": ENGINE_VERSION,
        "workflow_id": exec.workflow.definition.id,
        "definition_hash": exec.workflow.definition_hash,
        "execution_id": exec.id,
        "completed": completed,
        "finished": finished,
    });
    match inner.recovery
               .create_checkpoint(CheckpointKind::Job, &exec.job_id, None, position, None)
    {
        Ok(cp) => inner.emit(exec.id,
                             FlowEventKind::CheckpointCreated { checkpoint_id: cp.id,
                                                                completed_steps: count }),
        Err(e) => warn!("could not checkpoint job '{}': {e}", exec.job_id),
    }
}

/// Steps completados registrados en un checkpoint `job` compatible.
pub(super) fn restored_steps(position: &Value, workflow_id: &str, definition_hash: &str) -> HashMap<String, (Value, u64)> {
    let compatible = position.get("engine_version").and_then(Value::as_str) == Some(ENGINE_VERSION)
                     && position.get("workflow_id").and_then(Value::as_str) == Some(workflow_id)
                     && position.get("definition_hash").and_then(Value::as_str) == Some(definition_hash);
    let finished = position.get("finished").and_then(Value::as_bool).unwrap_or(false);
    if !compatible || finished {
        return HashMap::new();
    }
    position.get("completed")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                 .map(|(k, v)| {
                     let out = v.get("output").cloned().unwrap_or(Value::Null);
                     let n = v.get("records_processed").and_then(Value::as_u64).unwrap_or(0);
                     (k.clone(), (out, n))
                 })
                 .collect()
            })
            .unwrap_or_default()
}
