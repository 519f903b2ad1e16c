//! `transform`: compara los registros extraídos con el estado actual del
//! destino (Change Detector) y resuelve los conflictos (Conflict Resolver).
//!
//! Registros iguales se descartan; cambios sin conflicto pasan tal cual;
//! conflictos resueltos pasan con el valor resuelto. Los que quedan
//! `pending_manual`, `failed` o `skipped` no se escriben.
//!
//! `pending_manual` y `failed` retienen la marca de agua por debajo de su
//! valor incremental, así el siguiente run los vuelve a leer. En ese run una
//! decisión manual ya tomada se escribe (o se descarta si fue rechazada) en
//! lugar de abrir un conflicto nuevo.
use async_trait::async_trait;
use log::{debug, info};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use sync_core::{ExecutionContext, StepError, StepHandler, StepOutput, WorkflowStep};
use sync_domain::{ChangeDetector, ChangeRecord};
use sync_policies::{Conflict, ConflictResolver, ConflictStatus, ResolvedValue};

use super::{capped_high_water_mark, decode_records, encode_records, page_size, required_param, table_of, upstream};
use crate::connector::{Connector, ConnectorRegistry, FetchRequest};

pub struct TransformHandler {
    connectors: Arc<ConnectorRegistry>,
    detector: Arc<ChangeDetector>,
    resolver: Arc<ConflictResolver>,
}

fn materialize(source: &ChangeRecord, value: &ResolvedValue) -> ChangeRecord {
    let mut rec = source.clone();
    if value.deleted {
        rec.deleted = true;
    } else if let Some(data) = &value.data {
        rec.payload = data.clone();
        rec.deleted = false;
    }
    rec
}

#[derive(Default)]
struct Tally {
    unchanged: u64,
    resolved: u64,
    applied: u64,
    pending: u64,
    failed: u64,
    dropped: u64,
}

/// Marca de agua que no pasa de ningún registro retenido. Si alguno no
/// tiene valor incremental se queda en la posición de partida.
fn held_back_mark(upstream: &Value, field: &str, seen: &[Value], held: &[ChangeRecord]) -> Value {
    let floor = upstream.get("resume_from").filter(|v| !v.is_null()).cloned();
    let marks: Option<Vec<Value>> = held.iter().map(|r| r.field(field).cloned()).collect();
    let mark = match marks {
        Some(marks) => capped_high_water_mark(seen, &marks, floor),
        None => floor,
    };
    mark.unwrap_or(Value::Null)
}

impl TransformHandler {
    pub fn new(connectors: Arc<ConnectorRegistry>, detector: Arc<ChangeDetector>, resolver: Arc<ConflictResolver>) -> Self {
        Self { connectors,
               detector,
               resolver }
    }

    async fn current_state(&self,
                           target: &dyn Connector,
                           size: usize,
                           ctx: &ExecutionContext)
                           -> Result<HashMap<String, ChangeRecord>, StepError> {
        let mut out = HashMap::new();
        let mut offset = 0;
        loop {
            if ctx.is_cancelled() {
                return Err(StepError::cancelled());
            }
            let batch = target.fetch(&FetchRequest::page(size, offset)).await?;
            offset += batch.records.len();
            let more = batch.has_more && !batch.records.is_empty();
            out.extend(batch.records.into_iter().map(|r| (r.record_id.clone(), r)));
            if !more {
                return Ok(out);
            }
        }
    }
}

#[async_trait]
impl StepHandler for TransformHandler {
    async fn handle(&self, step: &WorkflowStep, ctx: &ExecutionContext) -> Result<StepOutput, StepError> {
        let table = table_of(step)?;
        let upstream = upstream(step, ctx)?;
        let incoming = decode_records(upstream)?;
        let target = self.connectors.get(required_param(step, "target")?)?;
        let mut existing = self.current_state(target.as_ref(), page_size(step), ctx).await?;

        let field = upstream.get("incremental_field").and_then(Value::as_str);
        let seen: Vec<Value> = match field {
            Some(f) => incoming.iter().filter_map(|r| r.field(f)).cloned().collect(),
            None => Vec::new(),
        };
        let mut pairs = Vec::new();
        let mut changed = Vec::new();
        for rec in incoming {
            match existing.remove(&rec.record_id) {
                Some(current) => pairs.push((rec, current)),
                None => changed.push(rec),
            }
        }
        let results = self.detector.detect_batch(Some(&table), &pairs);
        debug!("transform {table}: {} new, {} to compare", changed.len(), pairs.len());

        let mut tally = Tally::default();
        let mut conflict_ids = Vec::new();
        // No se escriben en esta pasada; la siguiente debe volver a leerlos.
        let mut held: Vec<ChangeRecord> = Vec::new();
        for ((source, current), result) in pairs.into_iter().zip(results) {
            let Some(detected) = result.primary_conflict() else {
                if result.equal {
                    tally.unchanged += 1;
                } else {
                    changed.push(source);
                }
                continue;
            };
            if let Some(decision) = self.resolver.manual_decision(&table, &source.record_id) {
                conflict_ids.push(decision.id.to_string());
                if decision.status == ConflictStatus::PendingManual {
                    tally.pending += 1;
                    held.push(source);
                    continue;
                }
                match decision.resolved_value() {
                    Some(value) if decision.status == ConflictStatus::Resolved => {
                        tally.applied += 1;
                        changed.push(materialize(&source, value));
                    }
                    _ => tally.dropped += 1,
                }
                self.resolver
                    .mark_applied(decision.id)
                    .map_err(|e| StepError::conflict(e.to_string()))?;
                continue;
            }
            let conflict = Conflict::from_detected(&table, detected, source.clone(), current);
            let outcome = self.resolver
                              .resolve(conflict)
                              .await
                              .map_err(|e| StepError::conflict(e.to_string()))?;
            conflict_ids.push(outcome.id.to_string());
            match (outcome.status, outcome.resolved_value()) {
                (ConflictStatus::Resolved, Some(value)) => {
                    tally.resolved += 1;
                    changed.push(materialize(&source, value));
                }
                (ConflictStatus::PendingManual, _) => {
                    tally.pending += 1;
                    held.push(source);
                }
                (ConflictStatus::Failed, _) => {
                    tally.failed += 1;
                    held.push(source);
                }
                _ => tally.dropped += 1,
            }
        }

        let hwm = match field {
            Some(f) => held_back_mark(upstream, f, &seen, &held),
            None => upstream.get("high_water_mark").cloned().unwrap_or(Value::Null),
        };
        if !held.is_empty() {
            info!("transform {table}: {} record(s) held back, high water mark {hwm}", held.len());
        }
        info!("transform {table}: {} to write, {} resolved, {} manual applied, {} pending manual, {} failed, {} unchanged",
              changed.len(),
              tally.resolved,
              tally.applied,
              tally.pending,
              tally.failed,
              tally.unchanged);
        let encoded = encode_records(&changed)?;
        let records = changed.len() as u64;
        Ok(StepOutput::new(json!({
                               "table": table,
                               "records": encoded,
                               "incremental_field": field,
                               "high_water_mark": hwm,
                               "conflicts": conflict_ids,
                               "resolved": tally.resolved,
                               "manual_applied": tally.applied,
                               "pending_manual": tally.pending,
                               "failed": tally.failed,
                               "dropped": tally.dropped,
                               "unchanged": tally.unchanged,
                           })).with_records(records))
    }
}
