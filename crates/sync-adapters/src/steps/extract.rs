//! `extract`: lee de un conector fuente, de forma incremental si el step
//! declara `incremental_field`.
//!
//! El punto de reanudación es el último checkpoint `table` del par
//! (job, tabla); sólo se piden registros posteriores a esa posición, así que
//! re-ejecutar un job no reprocesa lo ya cargado.
use async_trait::async_trait;
use log::{debug, info};
use serde_json::{json, Value};
use std::sync::Arc;
use sync_core::{CheckpointKind, ExecutionContext, RecoverySystem, StepError, StepHandler, StepOutput, WorkflowStep};

use super::{encode_records, high_water_mark, page_size, param_str, required_param, table_of};
use crate::connector::{ConnectorRegistry, FetchRequest};

pub struct ExtractHandler {
    connectors: Arc<ConnectorRegistry>,
    recovery: Arc<RecoverySystem>,
}

impl ExtractHandler {
    pub fn new(connectors: Arc<ConnectorRegistry>, recovery: Arc<RecoverySystem>) -> Self {
        Self { connectors,
               recovery }
    }

    fn resume_point(&self, job_id: &str, table: &str, field: &str) -> Result<Option<Value>, StepError> {
        let latest = self.recovery
                         .find_latest_checkpoint(job_id, Some(table), Some(CheckpointKind::Table))
                         .map_err(|e| StepError::new("checkpoint", e.to_string()))?;
        Ok(latest.filter(|cp| cp.position.get("incremental_field").and_then(Value::as_str) == Some(field))
                 .and_then(|cp| cp.position.get("value").cloned())
                 .filter(|v| !v.is_null()))
    }
}

#[async_trait]
impl StepHandler for ExtractHandler {
    async fn handle(&self, step: &WorkflowStep, ctx: &ExecutionContext) -> Result<StepOutput, StepError> {
        let table = table_of(step)?;
        let connector = self.connectors.get(required_param(step, "connector")?)?;
        let field = param_str(step, "incremental_field");
        let after = match field {
            Some(f) => self.resume_point(&ctx.job_id, &table, f)?,
            None => None,
        };
        debug!("extract {table} from {} after {:?}", connector.name(), after);

        let size = page_size(step);
        let mut records = Vec::new();
        let mut offset = 0;
        loop {
            if ctx.is_cancelled() {
                return Err(StepError::cancelled());
            }
            let mut request = FetchRequest::page(size, offset);
            if let Some(f) = field {
                request = request.incremental(f, after.clone());
            }
            let batch = connector.fetch(&request).await?;
            offset += batch.records.len();
            let more = batch.has_more && !batch.records.is_empty();
            records.extend(batch.records);
            if !more {
                break;
            }
        }

        let hwm = field.and_then(|f| high_water_mark(&records, f, after.clone()));
        info!("extracted {} record(s) from {table}", records.len());
        let encoded = encode_records(&records)?;
        Ok(StepOutput::new(json!({
                               "table": table,
                               "records": encoded,
                               "incremental_field": field,
                               "resume_from": after,
                               "high_water_mark": hwm,
                           })).with_records(records.len() as u64))
    }
}
