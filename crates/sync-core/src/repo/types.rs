//! Definiciones de workflow y su repositorio.
//!
//! Una `WorkflowDefinition` se valida al registrarse y es inmutable desde
//! entonces: re-registrar el mismo id la reemplaza completa. Las ejecuciones
//! en curso conservan su propia copia (`Arc`).
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::DagIndex;
use crate::errors::CoreEngineError;
use crate::hashing::hash_value;
use crate::step::WorkflowStep;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self { id: id.into(),
               name: name.into(),
               steps }
    }

    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Hash canónico de la definición completa.
    pub fn definition_hash(&self) -> String {
        serde_json::to_value(self).map(|v| hash_value(&v)).unwrap_or_default()
    }

    /// Valida el DAG y devuelve su índice.
    pub fn validate(&self) -> Result<DagIndex, CoreEngineError> {
        if self.steps.is_empty() {
            return Err(CoreEngineError::EmptyWorkflow(self.id.clone()));
        }
        DagIndex::build(&self.steps)
    }
}

/// Definición validada junto a su índice.
#[derive(Debug, Clone)]
pub struct RegisteredWorkflow {
    pub definition: WorkflowDefinition,
    pub dag: DagIndex,
    pub definition_hash: String,
}

/// Registro de definiciones.
pub trait WorkflowRepository: Send + Sync {
    /// Valida y guarda, reemplazando cualquier definición previa con el mismo
    /// id.
    fn register(&self, definition: WorkflowDefinition) -> Result<Arc<RegisteredWorkflow>, CoreEngineError>;
    fn get(&self, id: &str) -> Option<Arc<RegisteredWorkflow>>;
    fn list(&self) -> Vec<Arc<RegisteredWorkflow>>;
}

#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    inner: DashMap<String, Arc<RegisteredWorkflow>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkflowRepository for InMemoryWorkflowRepository {
    fn register(&self, definition: WorkflowDefinition) -> Result<Arc<RegisteredWorkflow>, CoreEngineError> {
        let dag = definition.validate()?;
        let definition_hash = definition.definition_hash();
        let registered = Arc::new(RegisteredWorkflow { definition,
                                                       dag,
                                                       definition_hash });
        self.inner.insert(registered.definition.id.clone(), Arc::clone(&registered));
        Ok(registered)
    }

    fn get(&self, id: &str) -> Option<Arc<RegisteredWorkflow>> {
        self.inner.get(id).map(|r| Arc::clone(r.value()))
    }

    fn list(&self) -> Vec<Arc<RegisteredWorkflow>> {
        let mut all: Vec<Arc<RegisteredWorkflow>> = self.inner.iter().map(|r| Arc::clone(r.value())).collect();
        all.sort_by(|a, b| a.definition.id.cmp(&b.definition.id));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reregistration_replaces_wholesale() {
        let repo = InMemoryWorkflowRepository::new();
        repo.register(WorkflowDefinition::new("wf", "v1", vec![WorkflowStep::new("a", "noop")]))
            .expect("v1");
        let v2 = WorkflowDefinition::new("wf",
                                         "v2",
                                         vec![WorkflowStep::new("a", "noop"),
                                              WorkflowStep::new("b", "noop").depends_on(["a"])]);
        repo.register(v2).expect("v2");
        let got = repo.get("wf").expect("registered");
        assert_eq!(got.definition.name, "v2");
        assert_eq!(got.dag.topo_order, vec!["a", "b"]);
        assert_eq!(repo.list().len(), 1);
    }

    #[test]
    fn invalid_definition_keeps_previous() {
        let repo = InMemoryWorkflowRepository::new();
        repo.register(WorkflowDefinition::new("wf", "ok", vec![WorkflowStep::new("a", "noop")]))
            .expect("ok");
        let bad = WorkflowDefinition::new("wf", "bad", vec![WorkflowStep::new("a", "noop").depends_on(["a"])]);
        assert!(repo.register(bad).is_err());
        assert_eq!(repo.get("wf").map(|r| r.definition.name.clone()), Some("ok".to_string()));
    }

    #[test]
    fn empty_definition_rejected() {
        let err = WorkflowDefinition::new("e", "e", vec![]).validate().unwrap_err();
        assert_eq!(err, CoreEngineError::EmptyWorkflow("e".into()));
    }
}
