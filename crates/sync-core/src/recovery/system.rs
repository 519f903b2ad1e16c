//! Recovery System: clasifica errores, elige estrategia y administra
//! checkpoints.
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use super::circuit::{CircuitBreakerConfig, CircuitBreakers, CircuitState};
use super::classify::{ErrorClass, ErrorClassifier, Severity};
use super::processor::QueuedAction;
use super::{Checkpoint, CheckpointKind, CheckpointStore, InMemoryCheckpointStore};
use crate::constants::{DEFAULT_CHECKPOINT_RETENTION_DAYS, DEFAULT_HISTORY_RETENTION_SECS};
use crate::errors::{CheckpointError, RecoveryError, StepError};
use crate::locks;
use crate::step::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    ManualIntervention,
    ExponentialBackoff,
    LinearBackoff,
    SkipAndContinue,
    CircuitBreaker,
}

impl RecoveryStrategy {
    pub fn for_class(class: ErrorClass) -> Self {
        match class {
            ErrorClass::Critical => Self::ManualIntervention,
            ErrorClass::Connection => Self::ExponentialBackoff,
            ErrorClass::Timeout => Self::LinearBackoff,
            ErrorClass::Validation | ErrorClass::Conflict => Self::SkipAndContinue,
            ErrorClass::Unknown => Self::ExponentialBackoff,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManualIntervention => "manual_intervention",
            Self::ExponentialBackoff => "exponential_backoff",
            Self::LinearBackoff => "linear_backoff",
            Self::SkipAndContinue => "skip_and_continue",
            Self::CircuitBreaker => "circuit_breaker",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Tipos declarados que requieren intervención humana.
    pub critical_error_types: Vec<String>,
    pub circuit: CircuitBreakerConfig,
    /// `<= 0` desactiva la poda de checkpoints.
    pub checkpoint_retention_days: i64,
    /// Cuánto se conservan errores cerrados y acciones ya ejecutadas.
    pub history_retention: Duration,
    /// Procesa la cola de acciones en paralelo (acotado por
    /// `recovery_workers`).
    pub parallel_recovery: bool,
    pub recovery_workers: usize,
    /// Pausa del loop de recuperación cuando la cola está vacía.
    pub idle_tick: Duration,
    /// Curva usada por la cola para reintentar operaciones encoladas.
    pub retry: RetryConfig,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self { critical_error_types: vec!["critical".into(), "data_corruption".into(), "authentication".into()],
               circuit: CircuitBreakerConfig::default(),
               checkpoint_retention_days: DEFAULT_CHECKPOINT_RETENTION_DAYS,
               history_retention: Duration::from_secs(DEFAULT_HISTORY_RETENTION_SECS),
               parallel_recovery: false,
               recovery_workers: 4,
               idle_tick: Duration::from_secs(1),
               retry: RetryConfig::default() }
    }
}

/// Contexto del fallo entregado a `handle_error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub job_id: String,
    /// Qué falló (step id, tabla, conector...).
    pub target: String,
    /// Reintentos ya realizados para `target`.
    pub retry_count: u32,
    pub details: Value,
}

impl ErrorContext {
    pub fn new(job_id: impl Into<String>, target: impl Into<String>) -> Self {
        Self { job_id: job_id.into(),
               target: target.into(),
               retry_count: 0,
               details: Value::Null }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub id: Uuid,
    /// Clase asignada por el clasificador.
    pub error_type: ErrorClass,
    /// Tipo declarado por quien produjo el error.
    pub declared_type: String,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub job_id: String,
    pub context: Value,
    pub retry_count: u32,
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum ActionOutcome {
    Pending,
    Succeeded,
    /// Reintentos agotados: fallo permanente.
    Exhausted(String),
    Skipped,
    /// Requiere intervención humana o el breaker estaba abierto.
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub id: Uuid,
    pub error_id: Uuid,
    pub strategy: RecoveryStrategy,
    pub target: String,
    /// Incluye `retry_count`, `error_type`, `severity` y `message`.
    pub parameters: Value,
    pub scheduled_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub outcome: ActionOutcome,
}

impl RecoveryAction {
    pub fn retry_count(&self) -> u32 {
        let raw = self.parameters.get("retry_count").and_then(Value::as_u64).unwrap_or(0);
        u32::try_from(raw).unwrap_or(u32::MAX)
    }

    pub fn error_type(&self) -> &str {
        self.parameters.get("error_type").and_then(Value::as_str).unwrap_or("unknown")
    }
}

/// Límite de poda para una retención en días. `None` (no podar) si `days`
/// no es positivo o el instante resultante no es representable.
pub fn retention_cutoff(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    if days <= 0 {
        return None;
    }
    ChronoDuration::try_days(days).and_then(|d| now.checked_sub_signed(d))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub total: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub by_strategy: BTreeMap<String, usize>,
    pub exhausted: u64,
    pub recovered: u64,
    pub circuits: BTreeMap<String, CircuitState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub total: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub by_job: BTreeMap<String, usize>,
    pub latest_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub(super) struct Counters {
    pub(super) exhausted: u64,
    pub(super) recovered: u64,
}

pub struct RecoverySystem {
    pub(super) config: RecoveryConfig,
    classifier: ErrorClassifier,
    breakers: CircuitBreakers,
    errors: Mutex<HashMap<Uuid, ErrorInfo>>,
    actions: Mutex<IndexMap<Uuid, RecoveryAction>>,
    pub(super) queue: Mutex<VecDeque<QueuedAction>>,
    pub(super) counters: Mutex<Counters>,
    last_prune: Mutex<DateTime<Utc>>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl Default for RecoverySystem {
    fn default() -> Self {
        Self::new(RecoveryConfig::default(), Arc::new(InMemoryCheckpointStore::new()))
    }
}

impl RecoverySystem {
    pub fn new(config: RecoveryConfig, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self { classifier: ErrorClassifier::new(&config.critical_error_types),
               breakers: CircuitBreakers::new(config.circuit.clone()),
               config,
               errors: Mutex::new(HashMap::new()),
               actions: Mutex::new(IndexMap::new()),
               queue: Mutex::new(VecDeque::new()),
               counters: Mutex::new(Counters::default()),
               last_prune: Mutex::new(Utc::now()),
               checkpoints }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn checkpoint_store(&self) -> Arc<dyn CheckpointStore> {
        Arc::clone(&self.checkpoints)
    }

    pub fn classify(&self, err: &StepError) -> ErrorClass {
        self.classifier.classify(&err.kind, &err.message)
    }

    /// Clasifica `err`, consulta el circuit breaker de su clase y devuelve la
    /// acción elegida. El `ErrorInfo` queda registrado sin resolver.
    pub fn handle_error(&self, err: &StepError, ctx: ErrorContext) -> RecoveryAction {
        let class = self.classify(err);
        let severity = class.severity();
        let strategy = if self.breakers.record_failure(class.as_str()) {
            RecoveryStrategy::CircuitBreaker
        } else {
            RecoveryStrategy::for_class(class)
        };
        let info = ErrorInfo { id: Uuid::new_v4(),
                               error_type: class,
                               declared_type: err.kind.clone(),
                               message: err.message.clone(),
                               severity,
                               timestamp: Utc::now(),
                               job_id: ctx.job_id.clone(),
                               context: ctx.details.clone(),
                               retry_count: ctx.retry_count,
                               resolved: false };
        let action = RecoveryAction { id: Uuid::new_v4(),
                                      error_id: info.id,
                                      strategy,
                                      target: ctx.target.clone(),
                                      parameters: json!({
                                          "retry_count": ctx.retry_count,
                                          "error_type": class.as_str(),
                                          "severity": severity.as_str(),
                                          "message": err.message,
                                          "job_id": ctx.job_id,
                                      }),
                                      scheduled_at: Utc::now(),
                                      executed_at: None,
                                      outcome: ActionOutcome::Pending };
        debug!("error on '{}' classified {} ({}) -> {}",
               ctx.target,
               class.as_str(),
               severity.as_str(),
               strategy.as_str());
        locks::lock(&self.errors).insert(info.id, info);
        locks::lock(&self.actions).insert(action.id, action.clone());
        self.prune_if_due();
        action
    }

    /// Marca un error como resuelto y cierra el breaker de su clase.
    pub fn mark_resolved(&self, error_id: Uuid) -> Result<(), RecoveryError> {
        let class = {
            let mut errors = locks::lock(&self.errors);
            let info = errors.get_mut(&error_id).ok_or(RecoveryError::UnknownError(error_id))?;
            info.resolved = true;
            info.error_type
        };
        self.breakers.record_success(class.as_str());
        locks::lock(&self.counters).recovered += 1;
        Ok(())
    }

    /// Registra el agotamiento de reintentos de una acción.
    pub fn record_exhausted(&self, action_id: Uuid, reason: &str) {
        self.set_outcome(action_id, ActionOutcome::Exhausted(reason.to_string()));
        locks::lock(&self.counters).exhausted += 1;
        warn!("recovery action {action_id} exhausted: {reason}");
    }

    pub(super) fn set_outcome(&self, action_id: Uuid, outcome: ActionOutcome) {
        if let Some(a) = locks::lock(&self.actions).get_mut(&action_id) {
            a.executed_at = Some(Utc::now());
            a.outcome = outcome;
        }
    }

    /// Cierra las acciones aún `Pending` de `ids` con `outcome`. Lo usa quien
    /// ejecuta los reintentos fuera de la cola (el orquestador).
    pub fn settle_actions(&self, ids: &[Uuid], outcome: &ActionOutcome) {
        let now = Some(Utc::now());
        let mut actions = locks::lock(&self.actions);
        for id in ids {
            if let Some(a) = actions.get_mut(id).filter(|a| a.outcome == ActionOutcome::Pending) {
                a.executed_at = now;
                a.outcome = outcome.clone();
            }
        }
    }

    /// Olvida errores y acciones cerrados hace más de `history_retention`.
    /// Un error se conserva mientras alguna acción suya siga pendiente.
    pub fn prune_history(&self) -> usize {
        let now = Utc::now();
        *locks::lock(&self.last_prune) = now;
        let Some(cutoff) = ChronoDuration::from_std(self.config.history_retention).ok()
                                                                                   .and_then(|d| now.checked_sub_signed(d))
        else {
            return 0;
        };
        let (removed_actions, open_errors) = {
            let mut actions = locks::lock(&self.actions);
            let before = actions.len();
            actions.retain(|_, a| a.outcome == ActionOutcome::Pending || a.executed_at.map_or(true, |at| at > cutoff));
            let open: HashSet<Uuid> = actions.values()
                                             .filter(|a| a.outcome == ActionOutcome::Pending)
                                             .map(|a| a.error_id)
                                             .collect();
            (before - actions.len(), open)
        };
        let removed_errors = {
            let mut errors = locks::lock(&self.errors);
            let before = errors.len();
            errors.retain(|id, e| open_errors.contains(id) || e.timestamp > cutoff);
            before - errors.len()
        };
        let removed = removed_actions + removed_errors;
        if removed > 0 {
            debug!("pruned {removed_errors} errors and {removed_actions} actions older than {cutoff}");
        }
        removed
    }

    fn prune_if_due(&self) {
        let now = Utc::now();
        let due = {
            let last = locks::lock(&self.last_prune);
            ChronoDuration::from_std(self.config.history_retention / 4).map_or(false, |every| now - *last >= every)
        };
        if due {
            self.prune_history();
        }
    }

    pub fn error(&self, error_id: Uuid) -> Option<ErrorInfo> {
        locks::lock(&self.errors).get(&error_id).cloned()
    }

    pub fn actions(&self) -> Vec<RecoveryAction> {
        locks::lock(&self.actions).values().cloned().collect()
    }

    pub fn action(&self, action_id: Uuid) -> Option<RecoveryAction> {
        locks::lock(&self.actions).get(&action_id).cloned()
    }

    pub fn circuit_state(&self, error_type: ErrorClass) -> CircuitState {
        self.breakers.state(error_type.as_str())
    }

    /// Append-only, seguido de poda por retención.
    pub fn create_checkpoint(&self,
                             kind: CheckpointKind,
                             job_id: &str,
                             table: Option<&str>,
                             position: Value,
                             snapshot: Option<Value>)
                             -> Result<Checkpoint, CheckpointError> {
        let mut cp = Checkpoint::new(kind, job_id, table.map(str::to_string), position);
        cp.snapshot = snapshot;
        let stored = self.checkpoints.append(cp)?;
        let Some(cutoff) = retention_cutoff(Utc::now(), self.config.checkpoint_retention_days) else {
            return Ok(stored);
        };
        let pruned = self.checkpoints.prune_older_than(cutoff)?;
        if pruned > 0 {
            info!("pruned {pruned} checkpoints older than {cutoff}");
        }
        Ok(stored)
    }

    pub fn find_latest_checkpoint(&self,
                                  job_id: &str,
                                  table: Option<&str>,
                                  kind: Option<CheckpointKind>)
                                  -> Result<Option<Checkpoint>, CheckpointError> {
        self.checkpoints.latest(job_id, table, kind)
    }

    pub fn error_summary(&self) -> ErrorSummary {
        let mut summary = ErrorSummary::default();
        {
            let errors = locks::lock(&self.errors);
            for info in errors.values() {
                summary.total += 1;
                if info.resolved {
                    summary.resolved += 1;
                }
                *summary.by_type.entry(info.error_type.as_str().to_string()).or_default() += 1;
                *summary.by_severity.entry(info.severity.as_str().to_string()).or_default() += 1;
            }
        }
        summary.unresolved = summary.total - summary.resolved;
        for action in locks::lock(&self.actions).values() {
            *summary.by_strategy.entry(action.strategy.as_str().to_string()).or_default() += 1;
        }
        {
            let counters = locks::lock(&self.counters);
            summary.exhausted = counters.exhausted;
            summary.recovered = counters.recovered;
        }
        summary.circuits = self.breakers.snapshot();
        summary
    }

    pub fn checkpoint_summary(&self) -> Result<CheckpointSummary, CheckpointError> {
        let all = self.checkpoints.list(None)?;
        let mut summary = CheckpointSummary { total: all.len(),
                                              ..Default::default() };
        for cp in &all {
            *summary.by_kind.entry(cp.kind.as_str().to_string()).or_default() += 1;
            *summary.by_job.entry(cp.job_id.clone()).or_default() += 1;
            summary.latest_at = summary.latest_at.max(Some(cp.created_at));
        }
        Ok(summary)
    }
}
