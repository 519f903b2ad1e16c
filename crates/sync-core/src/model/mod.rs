//! Tipos de modelo de ejecución: contexto entregado a los handlers y
//! resultados observables (`WorkflowResult`, `StepResult`).

mod context;
mod result;

pub use context::{CancelSignal, ExecutionContext};
pub use result::{ExecutionError, StepResult, WorkflowResult, WorkflowStatus};
