//! Definiciones relacionadas a Steps.
//!
//! Un step es una unidad de trabajo (extract/transform/load/custom) dentro de
//! un workflow DAG. Este módulo define:
//! - `WorkflowStep`: nodo inmutable del DAG (id, tipo, dependencias, timeout,
//!   retry).
//! - `StepHandler`: contrato ejecutable registrado por tipo de step.
//! - `StepStatus` y `RetryConfig`.

pub mod definition;
pub mod handler;
mod retry;
mod status;

pub use definition::{StepKind, WorkflowStep};
pub use handler::{handler_fn, StepHandler, StepOutput};
pub use retry::{saturating_millis, RetryConfig, RetryStrategy};
pub use status::StepStatus;
