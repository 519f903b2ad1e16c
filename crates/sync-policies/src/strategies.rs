//! Estrategias puras de resolución.
//!
//! Cada función recibe el `Conflict` y devuelve el valor candidato; no toca
//! el registro ni emite eventos. `Custom`, `Manual` y `Skip` no se resuelven
//! aquí: los gestiona `ConflictResolver`.
//!
//! Los merges no mezclan un borrado con datos: si algún lado está borrado
//! gana el lado más reciente entero, sea el borrado o la versión viva.
use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::conflict::{Conflict, ResolvedValue};
use crate::policy::{FieldRule, ResolutionPolicy, ResolutionStrategy};

/// Valor candidato para una estrategia integrada; `None` si la estrategia
/// no produce datos por sí misma.
pub fn apply(strategy: ResolutionStrategy, conflict: &Conflict, policy: &ResolutionPolicy) -> Option<ResolvedValue> {
    match strategy {
        ResolutionStrategy::LastWriteWins => Some(ResolvedValue::from_side(conflict.newer())),
        ResolutionStrategy::FirstWriteWins => Some(ResolvedValue::from_side(conflict.older())),
        ResolutionStrategy::SourcePriority => Some(ResolvedValue::from_side(&conflict.source)),
        ResolutionStrategy::TargetPriority => Some(ResolvedValue::from_side(&conflict.target)),
        ResolutionStrategy::FieldMerge => Some(field_merge(conflict, policy)),
        ResolutionStrategy::DeepMerge => Some(deep_merge_versions(conflict)),
        ResolutionStrategy::Custom | ResolutionStrategy::Manual | ResolutionStrategy::Skip => None,
    }
}

fn deletion_outcome(conflict: &Conflict) -> Option<ResolvedValue> {
    match (conflict.source.deleted, conflict.target.deleted) {
        (false, false) => None,
        (true, true) => Some(ResolvedValue { data: None,
                                             deleted: true,
                                             winner: None }),
        _ => Some(ResolvedValue::from_side(conflict.newer())),
    }
}

/// Merge campo a campo según `policy.field_rules` (por defecto gana source).
pub fn field_merge(conflict: &Conflict, policy: &ResolutionPolicy) -> ResolvedValue {
    if let Some(v) = deletion_outcome(conflict) {
        return v;
    }
    let source = &conflict.source.payload;
    let target = &conflict.target.payload;
    let source_is_newer = std::ptr::eq(conflict.newer(), &conflict.source);

    let mut merged = Map::new();
    let keys = source.keys().chain(target.keys().filter(|k| !source.contains_key(*k)));
    for key in keys {
        let s = source.get(key);
        let t = target.get(key);
        let value = match (s, t) {
            (Some(s), None) => Some(s.clone()),
            (None, Some(t)) => Some(t.clone()),
            (Some(s), Some(t)) => Some(apply_rule(policy.field_rule(key), s, t, source_is_newer)),
            (None, None) => None,
        };
        if let Some(v) = value {
            merged.insert(key.clone(), v);
        }
    }
    ResolvedValue::data(merged, None)
}

fn apply_rule(rule: FieldRule, s: &Value, t: &Value, source_is_newer: bool) -> Value {
    match rule {
        FieldRule::SourceWins => s.clone(),
        FieldRule::TargetWins => t.clone(),
        FieldRule::NewerWins => {
            if source_is_newer {
                s.clone()
            } else {
                t.clone()
            }
        }
        FieldRule::Max => pick_numeric(s, t, Ordering::Greater),
        FieldRule::Min => pick_numeric(s, t, Ordering::Less),
        FieldRule::Union => match (s, t) {
            (Value::Array(a), Value::Array(b)) => {
                let mut out = a.clone();
                for item in b {
                    if !out.contains(item) {
                        out.push(item.clone());
                    }
                }
                Value::Array(out)
            }
            _ => s.clone(),
        },
    }
}

// Valores no numéricos: gana source.
fn pick_numeric(s: &Value, t: &Value, want: Ordering) -> Value {
    match (s.as_f64(), t.as_f64()) {
        (Some(a), Some(b)) if b.partial_cmp(&a) == Some(want) => t.clone(),
        _ => s.clone(),
    }
}

fn deep_merge_versions(conflict: &Conflict) -> ResolvedValue {
    if let Some(v) = deletion_outcome(conflict) {
        return v;
    }
    let merged = deep_merge(&conflict.older().payload, &conflict.newer().payload);
    ResolvedValue::data(merged, None)
}

/// Merge recursivo de mapas anidados; en conflicto escalar gana `newer`.
pub fn deep_merge(older: &Map<String, Value>, newer: &Map<String, Value>) -> Map<String, Value> {
    let mut out = older.clone();
    for (key, nv) in newer {
        let merged = match (out.get(key), nv) {
            (Some(Value::Object(o)), Value::Object(n)) => Value::Object(deep_merge(o, n)),
            _ => nv.clone(),
        };
        out.insert(key.clone(), merged);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use sync_domain::{ConflictKind, DataVersion};

    fn conflict(source: Value, target: Value, source_newer: bool) -> Conflict {
        let now = Utc::now();
        let (ts_s, ts_t) = if source_newer { (now, now - Duration::seconds(30)) } else { (now - Duration::seconds(30), now) };
        let s = DataVersion::from_json("r1", "crm", source).unwrap().with_timestamp(ts_s);
        let t = DataVersion::from_json("r1", "warehouse", target).unwrap().with_timestamp(ts_t);
        Conflict::new("customers", ConflictKind::Content, s, t)
    }

    #[test]
    fn last_and_first_write_wins_pick_opposite_sides() {
        let c = conflict(json!({"name": "new"}), json!({"name": "old"}), true);
        let policy = ResolutionPolicy::default();
        let lww = apply(ResolutionStrategy::LastWriteWins, &c, &policy).unwrap();
        let fww = apply(ResolutionStrategy::FirstWriteWins, &c, &policy).unwrap();
        assert_eq!(lww.winner.as_deref(), Some("crm"));
        assert_eq!(fww.winner.as_deref(), Some("warehouse"));
        assert_eq!(lww.data.unwrap()["name"], json!("new"));
    }

    #[test]
    fn field_merge_applies_rules_per_field() {
        let c = conflict(json!({"name": "a", "score": 3, "tags": ["x"], "only_s": 1}),
                         json!({"name": "b", "score": 9, "tags": ["y", "x"], "only_t": 2}),
                         false);
        let policy = ResolutionPolicy::default().with_field_rule("score", FieldRule::Max)
                                                .with_field_rule("tags", FieldRule::Union);
        let merged = field_merge(&c, &policy).data.unwrap();
        assert_eq!(merged["name"], json!("a"));
        assert_eq!(merged["score"], json!(9));
        assert_eq!(merged["tags"], json!(["x", "y"]));
        assert_eq!(merged["only_s"], json!(1));
        assert_eq!(merged["only_t"], json!(2));
    }

    #[test]
    fn deep_merge_recurses_and_newer_wins_scalars() {
        let c = conflict(json!({"addr": {"city": "Lima", "zip": "1"}, "n": 1}),
                         json!({"addr": {"city": "Cusco", "street": "Sol"}, "n": 2}),
                         false);
        let merged = apply(ResolutionStrategy::DeepMerge, &c, &ResolutionPolicy::default()).unwrap().data.unwrap();
        assert_eq!(merged["addr"], json!({"city": "Cusco", "zip": "1", "street": "Sol"}));
        assert_eq!(merged["n"], json!(2));
    }

    #[test]
    fn deleted_newer_side_wins_as_delete() {
        let now = Utc::now();
        let s = DataVersion::from_json("r1", "crm", json!({"a": 1})).unwrap()
                                                                     .with_timestamp(now)
                                                                     .deleted();
        let t = DataVersion::from_json("r1", "wh", json!({"a": 1})).unwrap().with_timestamp(now - Duration::seconds(5));
        let c = Conflict::new("t", ConflictKind::Delete, s, t);
        let v = apply(ResolutionStrategy::LastWriteWins, &c, &ResolutionPolicy::default()).unwrap();
        assert!(v.deleted);
        assert!(v.data.is_none());
    }

    #[test]
    fn merges_never_revive_a_newer_delete() {
        let now = Utc::now();
        let policy = ResolutionPolicy::default();
        let gone = DataVersion::from_json("r1", "crm", json!({"a": 1})).unwrap()
                                                                        .with_timestamp(now)
                                                                        .deleted();
        let live = DataVersion::from_json("r1", "wh", json!({"a": 2, "b": 3})).unwrap()
                                                                               .with_timestamp(now - Duration::seconds(5));
        let c = Conflict::new("t", ConflictKind::Delete, gone.clone(), live.clone());
        for strategy in [ResolutionStrategy::FieldMerge, ResolutionStrategy::DeepMerge] {
            let v = apply(strategy, &c, &policy).unwrap();
            assert!(v.deleted, "{strategy:?}");
            assert!(v.data.is_none());
        }

        // Borrado más antiguo: gana la versión viva tal cual.
        let gone = gone.with_timestamp(now - Duration::seconds(60));
        let c = Conflict::new("t", ConflictKind::Delete, gone, live);
        let v = field_merge(&c, &policy);
        assert!(!v.deleted);
        assert_eq!(v.data.unwrap(), json!({"a": 2, "b": 3}).as_object().cloned().unwrap());
        assert_eq!(v.winner.as_deref(), Some("wh"));
    }
}
