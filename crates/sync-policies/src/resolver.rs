//! Conflict Resolver: selección de estrategia, validación, reintentos y
//! registro de conflictos pendientes de intervención manual.
//!
//! Precedencia de estrategia: override por tabla > override por tipo >
//! resolutor personalizado de la tabla > estrategia por defecto.
//!
//! Cada estructura compartida (registro, resolutores, validadores,
//! contadores, historial) tiene su propio lock; nunca se toman dos a la vez
//! ni se mantiene ninguno durante un `await`.
//!
//! Registro e historial están acotados por `retained_conflicts`: al
//! superarlo se olvidan los conflictos cerrados más antiguos. Los pendientes
//! y las decisiones manuales sin aplicar nunca se olvidan.
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use sync_core::event::{EventBus, EventListener, ListenerId};
use sync_core::locks;
use sync_domain::{ChangeDetector, ConflictKind, DataVersion};
use uuid::Uuid;

use crate::conflict::{Conflict, ConflictStatus, ResolutionRecord, ResolvedValue};
use crate::custom::{CustomResolver, ResolutionValidator};
use crate::errors::ResolverError;
use crate::events::{ConflictEvent, ConflictEventKind};
use crate::policy::{ResolutionPolicy, ResolutionStrategy};
use crate::strategies;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictCounters {
    pub detected: u64,
    pub resolved: u64,
    pub failed: u64,
    /// Conflictos actualmente en `pending_manual`.
    pub pending: u64,
    pub skipped: u64,
    pub rejected: u64,
}

impl ConflictCounters {
    pub fn resolution_rate(&self) -> f64 {
        if self.detected == 0 {
            0.0
        } else {
            self.resolved as f64 / self.detected as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolverStats {
    pub total: ConflictCounters,
    pub by_kind: BTreeMap<String, ConflictCounters>,
    pub by_table: BTreeMap<String, ConflictCounters>,
    pub resolution_rate: f64,
}

/// Entrada del historial de resoluciones aplicadas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionHistoryEntry {
    pub conflict_id: Uuid,
    pub table: String,
    pub record_id: String,
    pub kind: ConflictKind,
    pub strategy: ResolutionStrategy,
    pub status: ConflictStatus,
    pub actor: Option<String>,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

pub struct ConflictResolver {
    policy: RwLock<ResolutionPolicy>,
    registry: Mutex<HashMap<Uuid, Conflict>>,
    custom: RwLock<HashMap<String, Arc<dyn CustomResolver>>>,
    validators: RwLock<Vec<Arc<dyn ResolutionValidator>>>,
    stats: Mutex<ResolverStats>,
    history: Mutex<VecDeque<ResolutionHistoryEntry>>,
    /// (tabla, record_id) -> conflicto manual abierto.
    decisions: Mutex<HashMap<(String, String), Uuid>>,
    bus: EventBus<ConflictEvent>,
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(ResolutionPolicy::default())
    }
}

impl ConflictResolver {
    pub fn new(policy: ResolutionPolicy) -> Self {
        Self { policy: RwLock::new(policy),
               registry: Mutex::new(HashMap::new()),
               custom: RwLock::new(HashMap::new()),
               validators: RwLock::new(Vec::new()),
               stats: Mutex::new(ResolverStats::default()),
               history: Mutex::new(VecDeque::new()),
               decisions: Mutex::new(HashMap::new()),
               bus: EventBus::new() }
    }

    pub fn policy(&self) -> ResolutionPolicy {
        locks::read(&self.policy).clone()
    }

    pub fn set_policy(&self, policy: ResolutionPolicy) {
        *locks::write(&self.policy) = policy;
    }

    pub fn register_custom_resolver(&self, table: impl Into<String>, resolver: Arc<dyn CustomResolver>) {
        locks::write(&self.custom).insert(table.into(), resolver);
    }

    pub fn add_validator(&self, validator: Arc<dyn ResolutionValidator>) {
        locks::write(&self.validators).push(validator);
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener<ConflictEvent>>) -> ListenerId {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Registra el conflicto si es nuevo (cuenta `detected` y emite
    /// `conflict.detected`); si ya existe devuelve la copia registrada.
    pub fn register(&self, conflict: Conflict) -> Conflict {
        let limit = locks::read(&self.policy).retained_conflicts;
        {
            let mut registry = locks::lock(&self.registry);
            if let Some(existing) = registry.get(&conflict.id) {
                return existing.clone();
            }
            registry.insert(conflict.id, conflict.clone());
            evict_settled(&mut registry, limit);
        }
        self.bump(&conflict, |c| c.detected += 1);
        debug!("conflict {} ({}) detected on {}/{}",
               conflict.id,
               conflict.kind.as_str(),
               conflict.table,
               conflict.record_id);
        self.bus.emit(&ConflictEvent::of(ConflictEventKind::Detected, &conflict));
        conflict
    }

    /// Compara dos versiones y registra el conflicto de mayor prioridad, si
    /// lo hay.
    pub fn detect_and_register(&self,
                               detector: &ChangeDetector,
                               table: &str,
                               source: DataVersion,
                               target: DataVersion)
                               -> Option<Conflict> {
        let result = detector.compare_for_table(table, &source, &target);
        let primary = result.primary_conflict()?;
        Some(self.register(Conflict::from_detected(table, primary, source, target)))
    }

    pub fn select_strategy(&self, conflict: &Conflict) -> ResolutionStrategy {
        let has_custom = locks::read(&self.custom).contains_key(&conflict.table);
        Self::strategy_under(&locks::read(&self.policy), has_custom, conflict)
    }

    fn strategy_under(policy: &ResolutionPolicy, has_custom: bool, conflict: &Conflict) -> ResolutionStrategy {
        if let Some(s) = policy.table_overrides.get(&conflict.table) {
            return *s;
        }
        if let Some(s) = policy.type_overrides.get(&conflict.kind) {
            return *s;
        }
        if has_custom {
            return ResolutionStrategy::Custom;
        }
        policy.default_strategy
    }

    /// Resuelve un conflicto en estado `detected`. Un fallo de validación o
    /// del resolutor personalizado se reintenta hasta `max_attempts`; después
    /// el conflicto queda `failed` (se devuelve `Ok` con ese estado).
    pub async fn resolve(&self, conflict: Conflict) -> Result<Conflict, ResolverError> {
        let mut conflict = self.register(conflict);
        if conflict.status != ConflictStatus::Detected {
            return Err(ResolverError::InvalidState { id: conflict.id,
                                                     status: conflict.status });
        }
        let policy = self.policy();
        let strategy = self.select_strategy(&conflict);
        debug!("conflict {} resolving with {}", conflict.id, strategy.as_str());

        match strategy {
            ResolutionStrategy::Manual => {
                conflict.status = ConflictStatus::PendingManual;
                self.store(&conflict);
                locks::lock(&self.decisions).insert((conflict.table.clone(), conflict.record_id.clone()), conflict.id);
                self.bump(&conflict, |c| c.pending += 1);
                info!("conflict {} on {} awaits manual resolution", conflict.id, conflict.table);
                self.bus.emit(&ConflictEvent::of(ConflictEventKind::Pending, &conflict));
                return Ok(conflict);
            }
            ResolutionStrategy::Skip => {
                conflict.status = ConflictStatus::Skipped;
                conflict.resolution = Some(ResolutionRecord { strategy,
                                                              value: None,
                                                              resolved_at: Utc::now(),
                                                              actor: None,
                                                              reason: None,
                                                              attempts: conflict.attempts });
                self.store(&conflict);
                self.bump(&conflict, |c| c.skipped += 1);
                return Ok(conflict);
            }
            _ => {}
        }

        let max_attempts = policy.max_attempts.max(1);
        while conflict.attempts < max_attempts {
            conflict.status = ConflictStatus::Resolving;
            conflict.attempts += 1;
            self.store(&conflict);
            match self.candidate(strategy, &conflict, &policy).await {
                Ok(value) => {
                    conflict.status = ConflictStatus::Resolved;
                    conflict.last_error = None;
                    conflict.resolution = Some(ResolutionRecord { strategy,
                                                                  value: Some(value),
                                                                  resolved_at: Utc::now(),
                                                                  actor: None,
                                                                  reason: None,
                                                                  attempts: conflict.attempts });
                    self.store(&conflict);
                    self.bump(&conflict, |c| c.resolved += 1);
                    self.push_history(&conflict);
                    self.bus.emit(&ConflictEvent::of(ConflictEventKind::Resolved, &conflict));
                    return Ok(conflict);
                }
                Err(e) => {
                    warn!("conflict {} attempt {}/{} failed: {e}", conflict.id, conflict.attempts, max_attempts);
                    conflict.status = ConflictStatus::Detected;
                    conflict.last_error = Some(e.to_string());
                    self.store(&conflict);
                    if matches!(e, ResolverError::CustomResolverMissing(_)) {
                        break;
                    }
                }
            }
        }

        conflict.status = ConflictStatus::Failed;
        self.store(&conflict);
        self.bump(&conflict, |c| c.failed += 1);
        error!("conflict {} failed after {} attempts", conflict.id, conflict.attempts);
        self.bus.emit(&ConflictEvent::of(ConflictEventKind::Failed, &conflict));
        Ok(conflict)
    }

    async fn candidate(&self,
                       strategy: ResolutionStrategy,
                       conflict: &Conflict,
                       policy: &ResolutionPolicy)
                       -> Result<ResolvedValue, ResolverError> {
        let value = match strategy {
            ResolutionStrategy::Custom => {
                let resolver = locks::read(&self.custom).get(&conflict.table)
                                                        .cloned()
                                                        .ok_or_else(|| ResolverError::CustomResolverMissing(conflict.table.clone()))?;
                resolver.resolve(conflict).await.map_err(ResolverError::CustomFailed)?
            }
            other => strategies::apply(other, conflict, policy).ok_or(ResolverError::NotApplicable(other))?,
        };
        if policy.require_validation {
            self.validate(conflict, &value)?;
        }
        Ok(value)
    }

    fn validate(&self, conflict: &Conflict, candidate: &ResolvedValue) -> Result<(), ResolverError> {
        let validators: Vec<Arc<dyn ResolutionValidator>> = locks::read(&self.validators).clone();
        for v in validators {
            v.validate(conflict, candidate).map_err(ResolverError::ValidationFailed)?;
        }
        Ok(())
    }

    /// Única salida de `pending_manual` hacia `resolved`. Los validadores se
    /// aplican siempre.
    pub fn resolve_manually(&self,
                            id: Uuid,
                            data: Map<String, Value>,
                            actor: impl Into<String>,
                            reason: impl Into<String>)
                            -> Result<Conflict, ResolverError> {
        let current = self.expect_pending(id)?;
        let value = ResolvedValue::data(data, None);
        self.validate(&current, &value)?;
        let (actor, reason) = (actor.into(), reason.into());
        let conflict = self.transition(id, |c| {
                               c.status = ConflictStatus::Resolved;
                               c.resolution = Some(ResolutionRecord { strategy: ResolutionStrategy::Manual,
                                                                      value: Some(value),
                                                                      resolved_at: Utc::now(),
                                                                      actor: Some(actor),
                                                                      reason: Some(reason),
                                                                      attempts: c.attempts });
                           })?;
        self.bump(&conflict, |c| {
                c.pending = c.pending.saturating_sub(1);
                c.resolved += 1;
            });
        self.push_history(&conflict);
        info!("conflict {} resolved manually", conflict.id);
        self.bus.emit(&ConflictEvent::of(ConflictEventKind::Resolved, &conflict));
        Ok(conflict)
    }

    /// Descarta un conflicto pendiente sin aplicar datos.
    pub fn reject_manually(&self, id: Uuid, actor: impl Into<String>, reason: impl Into<String>) -> Result<Conflict, ResolverError> {
        let (actor, reason) = (actor.into(), reason.into());
        let conflict = self.transition(id, |c| {
                               c.status = ConflictStatus::Rejected;
                               c.resolution = Some(ResolutionRecord { strategy: ResolutionStrategy::Manual,
                                                                      value: None,
                                                                      resolved_at: Utc::now(),
                                                                      actor: Some(actor),
                                                                      reason: Some(reason),
                                                                      attempts: c.attempts });
                           })?;
        self.bump(&conflict, |c| {
                c.pending = c.pending.saturating_sub(1);
                c.rejected += 1;
            });
        self.push_history(&conflict);
        info!("conflict {} rejected", conflict.id);
        Ok(conflict)
    }

    /// Conflicto manual abierto para el registro: pendiente de un operador o
    /// ya decidido pero sin aplicar.
    pub fn manual_decision(&self, table: &str, record_id: &str) -> Option<Conflict> {
        let id = *locks::lock(&self.decisions).get(&(table.to_string(), record_id.to_string()))?;
        self.conflict(id).filter(|c| c.status == ConflictStatus::PendingManual || c.awaiting_apply())
    }

    /// Cierra una decisión manual una vez escrita (o descartada) en destino.
    pub fn mark_applied(&self, id: Uuid) -> Result<Conflict, ResolverError> {
        let conflict = {
            let mut registry = locks::lock(&self.registry);
            let conflict = registry.get_mut(&id).ok_or(ResolverError::UnknownConflict(id))?;
            if !conflict.awaiting_apply() {
                return Err(ResolverError::InvalidState { id,
                                                         status: conflict.status });
            }
            conflict.applied_at = Some(Utc::now());
            conflict.clone()
        };
        let mut decisions = locks::lock(&self.decisions);
        let key = (conflict.table.clone(), conflict.record_id.clone());
        if decisions.get(&key) == Some(&id) {
            decisions.remove(&key);
        }
        debug!("manual decision {id} applied to {}/{}", conflict.table, conflict.record_id);
        Ok(conflict)
    }

    fn expect_pending(&self, id: Uuid) -> Result<Conflict, ResolverError> {
        let conflict = self.conflict(id).ok_or(ResolverError::UnknownConflict(id))?;
        if conflict.status != ConflictStatus::PendingManual {
            return Err(ResolverError::InvalidState { id,
                                                     status: conflict.status });
        }
        Ok(conflict)
    }

    // Comprueba y muta bajo el mismo lock: dos llamadas manuales concurrentes
    // no pueden resolver el mismo conflicto.
    fn transition(&self, id: Uuid, apply: impl FnOnce(&mut Conflict)) -> Result<Conflict, ResolverError> {
        let mut registry = locks::lock(&self.registry);
        let conflict = registry.get_mut(&id).ok_or(ResolverError::UnknownConflict(id))?;
        if conflict.status != ConflictStatus::PendingManual {
            return Err(ResolverError::InvalidState { id,
                                                     status: conflict.status });
        }
        apply(conflict);
        Ok(conflict.clone())
    }

    fn store(&self, conflict: &Conflict) {
        locks::lock(&self.registry).insert(conflict.id, conflict.clone());
    }

    fn bump(&self, conflict: &Conflict, f: impl Fn(&mut ConflictCounters)) {
        let mut stats = locks::lock(&self.stats);
        f(&mut stats.total);
        f(stats.by_kind.entry(conflict.kind.as_str().to_string()).or_default());
        f(stats.by_table.entry(conflict.table.clone()).or_default());
        stats.resolution_rate = stats.total.resolution_rate();
    }

    fn push_history(&self, conflict: &Conflict) {
        let Some(res) = conflict.resolution.as_ref() else {
            return;
        };
        let limit = locks::read(&self.policy).retained_conflicts;
        let mut history = locks::lock(&self.history);
        history.push_back(ResolutionHistoryEntry { conflict_id: conflict.id,
                                                   table: conflict.table.clone(),
                                                   record_id: conflict.record_id.clone(),
                                                   kind: conflict.kind,
                                                   strategy: res.strategy,
                                                   status: conflict.status,
                                                   actor: res.actor.clone(),
                                                   reason: res.reason.clone(),
                                                   at: res.resolved_at });
        while history.len() > limit {
            history.pop_front();
        }
    }

    pub fn conflict(&self, id: Uuid) -> Option<Conflict> {
        locks::lock(&self.registry).get(&id).cloned()
    }

    /// Cola de intervención manual, más prioritarios primero.
    pub fn pending_manual(&self) -> Vec<Conflict> {
        let mut out: Vec<Conflict> = locks::lock(&self.registry).values()
                                                                .filter(|c| c.status == ConflictStatus::PendingManual)
                                                                .cloned()
                                                                .collect();
        out.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.detected_at.cmp(&b.detected_at)));
        out
    }

    pub fn conflicts_by_table(&self, table: &str) -> Vec<Conflict> {
        let mut out: Vec<Conflict> = locks::lock(&self.registry).values().filter(|c| c.table == table).cloned().collect();
        out.sort_by_key(|c| c.detected_at);
        out
    }

    pub fn resolution_history(&self, table: Option<&str>) -> Vec<ResolutionHistoryEntry> {
        locks::lock(&self.history).iter()
                                  .filter(|h| table.map_or(true, |t| h.table == t))
                                  .cloned()
                                  .collect()
    }

    pub fn stats(&self) -> ResolverStats {
        locks::lock(&self.stats).clone()
    }
}

/// Deja como mucho `limit` conflictos olvidando primero los cerrados más
/// antiguos. Recorta al 90% para no ordenar en cada alta.
fn evict_settled(registry: &mut HashMap<Uuid, Conflict>, limit: usize) {
    if registry.len() <= limit {
        return;
    }
    let target = limit - limit / 10;
    let mut settled: Vec<(DateTime<Utc>, Uuid)> = registry.values()
                                                          .filter(|c| c.is_settled())
                                                          .map(|c| (c.detected_at, c.id))
                                                          .collect();
    settled.sort_unstable();
    let excess = registry.len().saturating_sub(target);
    for (_, id) in settled.into_iter().take(excess) {
        registry.remove(&id);
    }
    debug!("conflict registry trimmed to {} entries", registry.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom::sync_resolver;
    use chrono::Duration;
    use serde_json::json;

    fn content_conflict(table: &str) -> Conflict {
        let now = Utc::now();
        let s = DataVersion::from_json("r1", "crm", json!({"email": "new@x.io"})).unwrap().with_timestamp(now);
        let t = DataVersion::from_json("r1", "wh", json!({"email": "old@x.io"})).unwrap()
                                                                                 .with_timestamp(now - Duration::seconds(2));
        Conflict::new(table, ConflictKind::Content, s, t)
    }

    #[tokio::test]
    async fn precedence_table_over_type_over_custom_over_default() {
        let resolver = ConflictResolver::new(ResolutionPolicy::default().with_type(ConflictKind::Content,
                                                                                   ResolutionStrategy::TargetPriority)
                                                                        .with_table("orders", ResolutionStrategy::SourcePriority));
        resolver.register_custom_resolver("users", sync_resolver(|c| Ok(ResolvedValue::from_side(&c.target))));
        resolver.register_custom_resolver("items", sync_resolver(|c| Ok(ResolvedValue::from_side(&c.target))));

        assert_eq!(resolver.select_strategy(&content_conflict("orders")), ResolutionStrategy::SourcePriority);
        assert_eq!(resolver.select_strategy(&content_conflict("users")), ResolutionStrategy::TargetPriority);
        let mut schema = content_conflict("items");
        schema.kind = ConflictKind::Schema;
        assert_eq!(resolver.select_strategy(&schema), ResolutionStrategy::Custom);
        schema.table = "plain".into();
        assert_eq!(resolver.select_strategy(&schema), ResolutionStrategy::LastWriteWins);
    }

    #[tokio::test]
    async fn validation_failures_retry_then_fail() {
        let resolver = ConflictResolver::new(ResolutionPolicy::default().requiring_validation());
        resolver.add_validator(Arc::new(|_: &Conflict, _: &ResolvedValue| Err::<(), String>("nope".into())));
        let out = resolver.resolve(content_conflict("t")).await.unwrap();
        assert_eq!(out.status, ConflictStatus::Failed);
        assert_eq!(out.attempts, 3);
        assert!(out.last_error.unwrap().contains("nope"));
        assert_eq!(resolver.stats().total.failed, 1);
    }

    #[tokio::test]
    async fn manual_flow_and_illegal_transitions() {
        let resolver = ConflictResolver::new(ResolutionPolicy::default().with_default(ResolutionStrategy::Manual));
        let pending = resolver.resolve(content_conflict("t")).await.unwrap();
        assert_eq!(pending.status, ConflictStatus::PendingManual);
        assert_eq!(resolver.pending_manual().len(), 1);
        assert_eq!(resolver.stats().total.pending, 1);

        let mut data = Map::new();
        data.insert("email".into(), json!("fixed@x.io"));
        let done = resolver.resolve_manually(pending.id, data.clone(), "ana", "verified by phone").unwrap();
        assert_eq!(done.status, ConflictStatus::Resolved);
        let res = done.resolution.unwrap();
        assert_eq!(res.actor.as_deref(), Some("ana"));
        assert_eq!(res.value.unwrap().data.unwrap()["email"], json!("fixed@x.io"));

        let again = resolver.resolve_manually(pending.id, data, "ana", "twice");
        assert!(matches!(again, Err(ResolverError::InvalidState { .. })));
        assert!(resolver.pending_manual().is_empty());
        assert_eq!(resolver.stats().total.pending, 0);
        assert_eq!(resolver.resolution_history(Some("t")).len(), 1);
    }

    #[tokio::test]
    async fn reject_is_terminal() {
        let resolver = ConflictResolver::new(ResolutionPolicy::default().with_default(ResolutionStrategy::Manual));
        let pending = resolver.resolve(content_conflict("t")).await.unwrap();
        let rejected = resolver.reject_manually(pending.id, "ops", "stale").unwrap();
        assert_eq!(rejected.status, ConflictStatus::Rejected);
        assert!(resolver.reject_manually(pending.id, "ops", "stale").is_err());
        assert!(matches!(resolver.reject_manually(Uuid::new_v4(), "ops", "x"),
                         Err(ResolverError::UnknownConflict(_))));
    }

    #[tokio::test]
    async fn skip_applies_nothing() {
        let resolver = ConflictResolver::new(ResolutionPolicy::default().with_default(ResolutionStrategy::Skip));
        let out = resolver.resolve(content_conflict("t")).await.unwrap();
        assert_eq!(out.status, ConflictStatus::Skipped);
        assert!(out.resolved_value().is_none());
        assert!(resolver.resolution_history(None).is_empty());
    }

    #[tokio::test]
    async fn manual_decision_stays_open_until_applied() {
        let resolver = ConflictResolver::new(ResolutionPolicy::default().with_default(ResolutionStrategy::Manual));
        assert!(resolver.manual_decision("t", "r1").is_none());
        let pending = resolver.resolve(content_conflict("t")).await.unwrap();
        assert_eq!(resolver.manual_decision("t", "r1").unwrap().id, pending.id);
        assert!(resolver.manual_decision("other", "r1").is_none());
        // Aún sin decidir: no hay nada que aplicar.
        assert!(matches!(resolver.mark_applied(pending.id), Err(ResolverError::InvalidState { .. })));

        let mut data = Map::new();
        data.insert("email".into(), json!("fixed@x.io"));
        resolver.resolve_manually(pending.id, data, "ana", "checked").unwrap();
        let open = resolver.manual_decision("t", "r1").unwrap();
        assert!(open.awaiting_apply());

        let applied = resolver.mark_applied(pending.id).unwrap();
        assert!(applied.applied_at.is_some());
        assert!(applied.is_settled());
        assert!(resolver.manual_decision("t", "r1").is_none());
        assert!(resolver.mark_applied(pending.id).is_err());
    }

    #[tokio::test]
    async fn retention_forgets_settled_conflicts_first() {
        let resolver = ConflictResolver::new(ResolutionPolicy::default().with_table("manual", ResolutionStrategy::Manual)
                                                                        .retaining(10));
        let pending = resolver.resolve(content_conflict("manual")).await.unwrap();
        let mut resolved = Vec::new();
        for _ in 0..25 {
            resolved.push(resolver.resolve(content_conflict("auto")).await.unwrap().id);
        }
        assert!(resolver.conflicts_by_table("auto").len() <= 10);
        assert!(resolver.conflict(resolved[0]).is_none());
        assert!(resolver.conflict(resolved[24]).is_some());
        assert_eq!(resolver.conflict(pending.id).unwrap().status, ConflictStatus::PendingManual);
        assert_eq!(resolver.resolution_history(None).len(), 10);
        assert_eq!(resolver.stats().total.detected, 26);
    }
}
