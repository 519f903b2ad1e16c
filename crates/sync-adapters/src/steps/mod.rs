//! Handlers estándar `extract`, `transform` y `load`.
//!
//! Los tres se comunican por el output JSON de su dependencia:
//! `{ "table", "records", "incremental_field", "resume_from", "high_water_mark" }`.
//! `resume_from` es la posición desde la que se leyó; `transform` la usa
//! como suelo al recortar la marca de agua por registros retenidos.
//! Parámetros comunes del step: `table` (o `action`), `connector`, `from`
//! (id del step del que leer; por defecto la primera dependencia con
//! `records`).

mod extract;
mod load;
mod transform;

pub use extract::ExtractHandler;
pub use load::LoadHandler;
pub use transform::TransformHandler;

use serde_json::Value;
use std::cmp::Ordering;
use sync_core::{ExecutionContext, StepError, WorkflowStep};
use sync_domain::ChangeRecord;

use crate::errors::ConnectorError;
use crate::memory::compare_values;

pub(crate) const DEFAULT_PAGE_SIZE: usize = 500;

pub(crate) fn param_str<'a>(step: &'a WorkflowStep, key: &str) -> Option<&'a str> {
    step.params.get(key).and_then(Value::as_str)
}

pub(crate) fn required_param<'a>(step: &'a WorkflowStep, key: &str) -> Result<&'a str, StepError> {
    param_str(step, key).ok_or_else(|| ConnectorError::InvalidParams(format!("step '{}' needs '{key}'", step.id)).into())
}

pub(crate) fn page_size(step: &WorkflowStep) -> usize {
    step.params
        .get("batch_size")
        .and_then(Value::as_u64)
        .map(|n| n.max(1) as usize)
        .unwrap_or(DEFAULT_PAGE_SIZE)
}

/// Tabla del step: `params.table`, luego `action`.
pub(crate) fn table_of(step: &WorkflowStep) -> Result<String, StepError> {
    param_str(step, "table").or(step.action.as_deref())
                            .map(str::to_string)
                            .ok_or_else(|| ConnectorError::InvalidParams(format!("step '{}' has no table", step.id)).into())
}

pub(crate) fn upstream<'a>(step: &WorkflowStep, ctx: &'a ExecutionContext) -> Result<&'a Value, StepError> {
    if let Some(from) = param_str(step, "from") {
        return ctx.output(from)
                  .ok_or_else(|| StepError::validation(format!("no output from step '{from}'")));
    }
    step.depends_on
        .iter()
        .filter_map(|dep| ctx.output(dep))
        .find(|out| out.get("records").is_some())
        .ok_or_else(|| StepError::validation(format!("step '{}' has no upstream records", step.id)))
}

pub(crate) fn decode_records(output: &Value) -> Result<Vec<ChangeRecord>, StepError> {
    let raw = output.get("records").cloned().unwrap_or(Value::Array(Vec::new()));
    serde_json::from_value(raw).map_err(|e| StepError::validation(format!("malformed records: {e}")))
}

pub(crate) fn encode_records(records: &[ChangeRecord]) -> Result<Value, StepError> {
    serde_json::to_value(records).map_err(|e| StepError::validation(format!("records not serializable: {e}")))
}

/// Mayor valor de `field` entre los registros (y `floor`, si se da).
pub(crate) fn high_water_mark(records: &[ChangeRecord], field: &str, floor: Option<Value>) -> Option<Value> {
    max_value(records.iter().filter_map(|r| r.field(field)).cloned(), floor)
}

/// Como `high_water_mark`, pero sin alcanzar ningún valor retenido: sólo
/// cuentan los valores estrictamente menores que el menor de `held`.
pub(crate) fn capped_high_water_mark(seen: &[Value], held: &[Value], floor: Option<Value>) -> Option<Value> {
    let lowest = held.iter()
                     .reduce(|low, v| if compare_values(v, low) == Some(Ordering::Less) { v } else { low });
    match lowest {
        None => max_value(seen.iter().cloned(), floor),
        Some(cap) => max_value(seen.iter().filter(|v| compare_values(v, cap) == Some(Ordering::Less)).cloned(),
                               floor),
    }
}

fn max_value(values: impl Iterator<Item = Value>, floor: Option<Value>) -> Option<Value> {
    values.chain(floor).fold(None, |best: Option<Value>, v| {
                           let newer = best.as_ref()
                                           .map_or(true, |b| compare_values(&v, b) == Some(Ordering::Greater));
                           if newer {
                               Some(v)
                           } else {
                               best
                           }
                       })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn high_water_mark_keeps_the_floor_when_nothing_is_newer() {
        let recs = vec![ChangeRecord::from_json("a", "s", json!({"seq": 3})).unwrap(),
                        ChangeRecord::from_json("b", "s", json!({"seq": 7})).unwrap()];
        assert_eq!(high_water_mark(&recs, "seq", None), Some(json!(7)));
        assert_eq!(high_water_mark(&recs, "seq", Some(json!(9))), Some(json!(9)));
        assert_eq!(high_water_mark(&[], "seq", Some(json!(9))), Some(json!(9)));
        assert_eq!(high_water_mark(&[], "seq", None), None);
    }

    #[test]
    fn held_values_cap_the_high_water_mark() {
        let seen = vec![json!(3), json!(5), json!(7), json!(9)];
        assert_eq!(capped_high_water_mark(&seen, &[], Some(json!(2))), Some(json!(9)));
        assert_eq!(capped_high_water_mark(&seen, &[json!(7), json!(5)], Some(json!(2))), Some(json!(3)));
        assert_eq!(capped_high_water_mark(&seen, &[json!(3)], Some(json!(2))), Some(json!(2)));
        assert_eq!(capped_high_water_mark(&seen, &[json!(3)], None), None);
    }

    #[test]
    fn table_falls_back_to_action() {
        let step = WorkflowStep::new("x", "extract").with_action("orders");
        assert_eq!(table_of(&step).unwrap(), "orders");
        assert!(table_of(&WorkflowStep::new("y", "extract")).is_err());
    }
}
