//! Contrato ejecutable de un step, registrado por tipo en el orquestador.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use super::WorkflowStep;
use crate::errors::StepError;
use crate::model::ExecutionContext;

/// Salida de un handler exitoso.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    /// Datos visibles para los steps dependientes vía `ExecutionContext`.
    pub data: Value,
    pub records_processed: u64,
}

impl StepOutput {
    pub fn new(data: Value) -> Self {
        Self { data,
               records_processed: 0 }
    }

    pub fn with_records(mut self, records: u64) -> Self {
        self.records_processed = records;
        self
    }
}

/// `handle(step, context) -> result | error`.
///
/// Los handlers hacen I/O externo y deben observar la cancelación del
/// contexto (`ctx.is_cancelled()` / `ctx.cancelled().await`) de forma
/// cooperativa.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn handle(&self, step: &WorkflowStep, ctx: &ExecutionContext) -> Result<StepOutput, StepError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> StepHandler for FnHandler<F>
    where F: Fn(WorkflowStep, ExecutionContext) -> Fut + Send + Sync,
          Fut: Future<Output = Result<StepOutput, StepError>> + Send
{
    async fn handle(&self, step: &WorkflowStep, ctx: &ExecutionContext) -> Result<StepOutput, StepError> {
        (self.0)(step.clone(), ctx.clone()).await
    }
}

/// Envuelve un closure async como handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn StepHandler>
    where F: Fn(WorkflowStep, ExecutionContext) -> Fut + Send + Sync + 'static,
          Fut: Future<Output = Result<StepOutput, StepError>> + Send + 'static
{
    Arc::new(FnHandler(f))
}
