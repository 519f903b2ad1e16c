//! `load`: escribe el lote del step anterior y, si la escritura fue
//! completa, avanza el checkpoint `table` con el nuevo high-water mark.
use async_trait::async_trait;
use log::{info, warn};
use serde_json::{json, Value};
use std::sync::Arc;
use sync_core::{CheckpointKind, ExecutionContext, RecoverySystem, StepError, StepHandler, StepOutput, WorkflowStep};

use super::{decode_records, param_str, required_param, table_of, upstream};
use crate::connector::{ConnectorRegistry, SyncResult, WriteMode};
use crate::errors::ConnectorError;

pub struct LoadHandler {
    connectors: Arc<ConnectorRegistry>,
    recovery: Arc<RecoverySystem>,
}

impl LoadHandler {
    pub fn new(connectors: Arc<ConnectorRegistry>, recovery: Arc<RecoverySystem>) -> Self {
        Self { connectors,
               recovery }
    }
}

#[async_trait]
impl StepHandler for LoadHandler {
    async fn handle(&self, step: &WorkflowStep, ctx: &ExecutionContext) -> Result<StepOutput, StepError> {
        let table = table_of(step)?;
        let upstream = upstream(step, ctx)?;
        let records = decode_records(upstream)?;
        let connector = self.connectors.get(required_param(step, "connector")?)?;
        let mode = match param_str(step, "mode") {
            Some(m) => WriteMode::parse(m).ok_or_else(|| ConnectorError::InvalidParams(format!("unknown write mode '{m}'")))?,
            None => WriteMode::default(),
        };
        if ctx.is_cancelled() {
            return Err(StepError::cancelled());
        }

        let result = if records.is_empty() {
            SyncResult::default()
        } else {
            connector.write(&records, mode).await?
        };
        if result.failed > 0 {
            warn!("load {table}: {} of {} record(s) rejected", result.failed, result.records_processed);
            return Err(StepError::validation(format!("{} record(s) rejected: {}",
                                                     result.failed,
                                                     result.errors.join("; "))));
        }

        let field = upstream.get("incremental_field").and_then(Value::as_str);
        let hwm = upstream.get("high_water_mark").filter(|v| !v.is_null());
        if let (Some(field), Some(hwm)) = (field, hwm) {
            let snapshot = json!({ "records_written": result.records_processed, "execution_id": ctx.execution_id });
            self.recovery
                .create_checkpoint(CheckpointKind::Table,
                                   &ctx.job_id,
                                   Some(&table),
                                   json!({ "incremental_field": field, "value": hwm }),
                                   Some(snapshot))
                .map_err(|e| StepError::new("checkpoint", e.to_string()))?;
        }

        info!("loaded {} record(s) into {table} via {}", result.records_processed, connector.name());
        let written = result.records_processed;
        let summary = serde_json::to_value(&result).map_err(|e| StepError::validation(e.to_string()))?;
        Ok(StepOutput::new(json!({ "table": table, "result": summary })).with_records(written))
    }
}
