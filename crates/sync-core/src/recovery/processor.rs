//! Loop dedicado de ejecución de acciones de recuperación.
//!
//! Las acciones encoladas con `enqueue` se ejecutan en `process_pending`,
//! en serie o en paralelo acotado por un semáforo de `recovery_workers`
//! permisos. Sólo las estrategias de backoff reintentan la operación; el
//! resto se resuelve sin ejecutarla (skip, manual, breaker abierto).
use async_trait::async_trait;
use log::{debug, info};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use super::backoff::{BackoffKind, BackoffPolicy};
use super::system::{ActionOutcome, RecoveryAction, RecoveryStrategy, RecoverySystem};
use crate::locks;

/// Operación a reintentar para recuperar un fallo.
#[async_trait]
pub trait RecoveryOperation: Send + Sync {
    async fn execute(&self, action: &RecoveryAction) -> Result<(), String>;
}

struct FnOperation<F>(F);

#[async_trait]
impl<F, Fut> RecoveryOperation for FnOperation<F>
    where F: Fn(RecoveryAction) -> Fut + Send + Sync,
          Fut: Future<Output = Result<(), String>> + Send
{
    async fn execute(&self, action: &RecoveryAction) -> Result<(), String> {
        (self.0)(action.clone()).await
    }
}

pub fn operation_fn<F, Fut>(f: F) -> Arc<dyn RecoveryOperation>
    where F: Fn(RecoveryAction) -> Fut + Send + Sync + 'static,
          Fut: Future<Output = Result<(), String>> + Send + 'static
{
    Arc::new(FnOperation(f))
}

pub(super) struct QueuedAction {
    action: RecoveryAction,
    operation: Arc<dyn RecoveryOperation>,
}

impl RecoverySystem {
    pub fn enqueue(&self, action: RecoveryAction, operation: Arc<dyn RecoveryOperation>) {
        locks::lock(&self.queue).push_back(QueuedAction { action, operation });
    }

    pub fn pending_actions(&self) -> usize {
        locks::lock(&self.queue).len()
    }

    /// Ejecuta todas las acciones encoladas y devuelve su estado final.
    pub async fn process_pending(self: &Arc<Self>) -> Vec<RecoveryAction> {
        let drained: Vec<QueuedAction> = locks::lock(&self.queue).drain(..).collect();
        if drained.is_empty() {
            return Vec::new();
        }
        debug!("processing {} recovery actions", drained.len());
        if !self.config.parallel_recovery {
            let mut done = Vec::with_capacity(drained.len());
            for queued in drained {
                done.push(self.run_action(queued).await);
            }
            return done;
        }

        let permits = Arc::new(Semaphore::new(self.config.recovery_workers.max(1)));
        let mut set = JoinSet::new();
        for (idx, queued) in drained.into_iter().enumerate() {
            let this = Arc::clone(self);
            let permits = Arc::clone(&permits);
            set.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                (idx, this.run_action(queued).await)
            });
        }
        let mut done = Vec::new();
        while let Some(joined) = set.join_next().await {
            if let Ok(pair) = joined {
                done.push(pair);
            }
        }
        done.sort_by_key(|(idx, _)| *idx);
        done.into_iter().map(|(_, a)| a).collect()
    }

    /// Procesa la cola hasta que `shutdown` pase a `true`. Con la cola vacía
    /// duerme `idle_tick` entre rondas.
    pub async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("recovery loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            if !self.process_pending().await.is_empty() {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.idle_tick) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("recovery loop stopped");
    }

    async fn run_action(&self, queued: QueuedAction) -> RecoveryAction {
        let QueuedAction { mut action, operation } = queued;
        let kind = match action.strategy {
            RecoveryStrategy::ExponentialBackoff => BackoffKind::Exponential,
            RecoveryStrategy::LinearBackoff => BackoffKind::Linear,
            RecoveryStrategy::SkipAndContinue => {
                return self.finish(action, ActionOutcome::Skipped);
            }
            RecoveryStrategy::ManualIntervention | RecoveryStrategy::CircuitBreaker => {
                return self.finish(action, ActionOutcome::Deferred);
            }
        };
        let policy = BackoffPolicy::new(kind, &self.config.retry);
        let mut attempt = action.retry_count();
        loop {
            let delay = match policy.delay_for(attempt) {
                Ok(d) => d,
                Err(e) => {
                    self.record_exhausted(action.id, &e.to_string());
                    action.outcome = ActionOutcome::Exhausted(e.to_string());
                    action.executed_at = Some(chrono::Utc::now());
                    return action;
                }
            };
            tokio::time::sleep(delay).await;
            match operation.execute(&action).await {
                Ok(()) => {
                    // El ErrorInfo puede no existir si la acción se construyó a mano.
                    let _ = self.mark_resolved(action.error_id);
                    return self.finish(action, ActionOutcome::Succeeded);
                }
                Err(e) => {
                    debug!("recovery attempt {attempt} for '{}' failed: {e}", action.target);
                    attempt += 1;
                    if let Some(obj) = action.parameters.as_object_mut() {
                        obj.insert("retry_count".into(), attempt.into());
                    }
                }
            }
        }
    }

    fn finish(&self, mut action: RecoveryAction, outcome: ActionOutcome) -> RecoveryAction {
        self.set_outcome(action.id, outcome.clone());
        action.outcome = outcome;
        action.executed_at = Some(chrono::Utc::now());
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StepError;
    use crate::recovery::{ErrorContext, InMemoryCheckpointStore, RecoveryConfig};
    use crate::step::RetryConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn system(parallel: bool) -> Arc<RecoverySystem> {
        let cfg = RecoveryConfig { parallel_recovery: parallel,
                                   retry: RetryConfig::exponential(2, Duration::from_millis(1), Duration::from_millis(5)),
                                   idle_tick: Duration::from_millis(5),
                                   ..RecoveryConfig::default() };
        Arc::new(RecoverySystem::new(cfg, Arc::new(InMemoryCheckpointStore::new())))
    }

    #[tokio::test]
    async fn backoff_action_succeeds_and_resolves_error() {
        let rs = system(false);
        let action = rs.handle_error(&StepError::connection("down"), ErrorContext::new("j", "users"));
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        rs.enqueue(action.clone(),
                   operation_fn(move |_a| {
                       let c = Arc::clone(&c);
                       async move {
                           if c.fetch_add(1, Ordering::SeqCst) == 0 {
                               Err("still down".to_string())
                           } else {
                               Ok(())
                           }
                       }
                   }));
        let done = rs.process_pending().await;
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].outcome, ActionOutcome::Succeeded);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(rs.error(action.error_id).unwrap().resolved);
    }

    #[tokio::test]
    async fn exhaustion_is_terminal() {
        let rs = system(true);
        let action = rs.handle_error(&StepError::timeout("slow"), ErrorContext::new("j", "t"));
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        rs.enqueue(action,
                   operation_fn(move |_a| {
                       c.fetch_add(1, Ordering::SeqCst);
                       async { Err("nope".to_string()) }
                   }));
        let done = rs.process_pending().await;
        assert!(matches!(done[0].outcome, ActionOutcome::Exhausted(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(rs.error_summary().exhausted, 1);
        assert_eq!(rs.pending_actions(), 0);
    }

    #[tokio::test]
    async fn non_retry_strategies_are_not_executed() {
        let rs = system(false);
        let skip = rs.handle_error(&StepError::validation("bad row"), ErrorContext::new("j", "t"));
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        rs.enqueue(skip,
                   operation_fn(move |_a| {
                       c.fetch_add(1, Ordering::SeqCst);
                       async { Ok(()) }
                   }));
        let done = rs.process_pending().await;
        assert_eq!(done[0].outcome, ActionOutcome::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn loop_drains_queue_until_shutdown() {
        let rs = system(false);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&rs).run_loop(rx));
        let action = rs.handle_error(&StepError::connection("x"), ErrorContext::new("j", "t"));
        rs.enqueue(action.clone(), operation_fn(|_a| async { Ok(()) }));
        for _ in 0..50 {
            if rs.error(action.error_id).map(|e| e.resolved).unwrap_or(false) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(rs.error(action.error_id).unwrap().resolved);
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
