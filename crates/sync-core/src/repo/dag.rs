//! Validación y recorrido del grafo de dependencias de un workflow.
//!
//! Orden de validación (cada caso con su error estable):
//! 1. ids duplicados -> `DuplicateStep`
//! 2. dependencia a sí mismo -> `SelfDependency`
//! 3. dependencia a id inexistente -> `InvalidDependency`
//! 4. ciclo (Kahn deja nodos sin procesar) -> `CyclicGraph`
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::errors::CoreEngineError;
use crate::step::WorkflowStep;

/// Índice precomputado de un DAG válido.
#[derive(Debug, Clone, PartialEq)]
pub struct DagIndex {
    /// Orden topológico estable (empates por orden de declaración).
    pub topo_order: Vec<String>,
    ancestors: HashMap<String, BTreeSet<String>>,
    dependents: HashMap<String, Vec<String>>,
}

impl DagIndex {
    pub fn build(steps: &[WorkflowStep]) -> Result<Self, CoreEngineError> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(steps.len());
        for s in steps {
            if !seen.insert(s.id.as_str()) {
                return Err(CoreEngineError::DuplicateStep(s.id.clone()));
            }
        }
        for s in steps {
            for dep in &s.depends_on {
                if dep == &s.id {
                    return Err(CoreEngineError::SelfDependency(s.id.clone()));
                }
                if !seen.contains(dep.as_str()) {
                    return Err(CoreEngineError::InvalidDependency { step: s.id.clone(),
                                                                    dependency: dep.clone() });
                }
            }
        }

        let mut in_degree: HashMap<&str, usize> = steps.iter().map(|s| (s.id.as_str(), s.depends_on.len())).collect();
        let mut dependents: HashMap<String, Vec<String>> = steps.iter().map(|s| (s.id.clone(), Vec::new())).collect();
        for s in steps {
            for dep in &s.depends_on {
                if let Some(list) = dependents.get_mut(dep) {
                    list.push(s.id.clone());
                }
            }
        }

        let mut queue: VecDeque<&str> = steps.iter()
                                              .filter(|s| s.depends_on.is_empty())
                                              .map(|s| s.id.as_str())
                                              .collect();
        let mut topo_order = Vec::with_capacity(steps.len());
        while let Some(id) = queue.pop_front() {
            topo_order.push(id.to_string());
            for child in dependents.get(id).map(Vec::as_slice).unwrap_or_default() {
                if let Some(d) = in_degree.get_mut(child.as_str()) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(child.as_str());
                    }
                }
            }
        }
        if topo_order.len() != steps.len() {
            let done: HashSet<&String> = topo_order.iter().collect();
            let mut stuck: Vec<String> = steps.iter().map(|s| s.id.clone()).filter(|id| !done.contains(id)).collect();
            stuck.sort();
            return Err(CoreEngineError::CyclicGraph(stuck));
        }

        // Ancestros transitivos, en orden topológico: cada padre ya está resuelto.
        let by_id: HashMap<&str, &WorkflowStep> = steps.iter().map(|s| (s.id.as_str(), s)).collect();
        let mut ancestors: HashMap<String, BTreeSet<String>> = HashMap::with_capacity(steps.len());
        for id in &topo_order {
            let mut set = BTreeSet::new();
            if let Some(step) = by_id.get(id.as_str()) {
                for dep in &step.depends_on {
                    set.insert(dep.clone());
                    if let Some(up) = ancestors.get(dep) {
                        set.extend(up.iter().cloned());
                    }
                }
            }
            ancestors.insert(id.clone(), set);
        }

        Ok(Self { topo_order,
                  ancestors,
                  dependents })
    }

    pub fn ancestors(&self, step_id: &str) -> impl Iterator<Item = &String> {
        self.ancestors.get(step_id).into_iter().flatten()
    }

    pub fn dependents(&self, step_id: &str) -> &[String] {
        self.dependents.get(step_id).map(Vec::as_slice).unwrap_or_default()
    }
}
