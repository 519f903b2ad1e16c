use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::watch;
use uuid::Uuid;

/// Señal de cancelación cooperativa compartida por todos los steps de una
/// ejecución.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx: Some(rx) }
    }

    /// Señal que nunca se dispara (tests, ejecuciones fuera del orquestador).
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resuelve cuando la ejecución es cancelada. Si el emisor desaparece sin
    /// cancelar, no resuelve nunca.
    pub async fn cancelled(&self) {
        let Some(rx) = self.rx.as_ref() else {
            return std::future::pending::<()>().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Contexto de ejecución entregado a `StepHandler::handle`.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub execution_id: Uuid,
    pub workflow_id: String,
    /// Identificador del job (clave de checkpoints). Por defecto el id de la
    /// ejecución.
    pub job_id: String,
    /// Input entregado a `execute`.
    pub input: Value,
    /// Outputs de los steps ancestros ya completados, por step id.
    pub outputs: HashMap<String, Value>,
    /// Número de reintentos ya realizados para este step (0 en el primer
    /// intento).
    pub attempt: u32,
    cancel: CancelSignal,
}

impl ExecutionContext {
    pub fn new(execution_id: Uuid, workflow_id: impl Into<String>, job_id: impl Into<String>, input: Value, cancel: CancelSignal) -> Self {
        Self { execution_id,
               workflow_id: workflow_id.into(),
               job_id: job_id.into(),
               input,
               outputs: HashMap::new(),
               attempt: 0,
               cancel }
    }

    /// Contexto suelto, útil para invocar handlers en tests.
    pub fn detached(job_id: impl Into<String>, input: Value) -> Self {
        Self::new(Uuid::new_v4(), "detached", job_id, input, CancelSignal::never())
    }

    pub fn with_output(mut self, step_id: impl Into<String>, output: Value) -> Self {
        self.outputs.insert(step_id.into(), output);
        self
    }

    pub fn output(&self, step_id: &str) -> Option<&Value> {
        self.outputs.get(step_id)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}
