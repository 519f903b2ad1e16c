use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::DomainError;

/// Versión de un registro tal como la leyó un conector. Inmutable una vez
/// producida.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataVersion {
    pub record_id: String,
    pub payload: Map<String, Value>,
    /// Token de versión/revisión explícito, si la fuente lo expone.
    pub version: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Sistema de origen (`source`, `target`, nombre del conector...).
    pub origin: String,
    pub deleted: bool,
}

/// Alias usado por los conectores para los registros leídos.
pub type ChangeRecord = DataVersion;

impl DataVersion {
    pub fn new(record_id: impl Into<String>, origin: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self { record_id: record_id.into(),
               payload,
               version: None,
               timestamp: None,
               origin: origin.into(),
               deleted: false }
    }

    /// Construye desde un objeto JSON; falla si `payload` no es un objeto.
    pub fn from_json(record_id: impl Into<String>, origin: impl Into<String>, payload: Value) -> Result<Self, DomainError> {
        match payload {
            Value::Object(map) => Ok(Self::new(record_id, origin, map)),
            other => Err(DomainError::ValidationError(format!("el payload debe ser un objeto, se recibió {other}"))),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    /// Nombres de campo fuera de `ignore`.
    pub fn field_names<'a>(&'a self, ignore: &BTreeSet<String>) -> BTreeSet<&'a str> {
        self.payload.keys().filter(|k| !ignore.contains(*k)).map(String::as_str).collect()
    }

    /// Payload completo como `Value` (para serializar o hashear).
    pub fn payload_value(&self) -> Value {
        Value::Object(self.payload.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// Diferencia en un campo, orientada de `a` (old) a `b` (new).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub kind: ChangeKind,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_requires_object() {
        assert!(DataVersion::from_json("1", "src", json!({"a": 1})).is_ok());
        let err = DataVersion::from_json("1", "src", json!([1, 2])).unwrap_err();
        assert!(matches!(err, DomainError::ValidationError(_)));
    }

    #[test]
    fn field_names_skip_ignored() {
        let rec = DataVersion::from_json("1", "src", json!({"a": 1, "updated_at": "x"})).unwrap();
        let ignore: BTreeSet<String> = ["updated_at".to_string()].into_iter().collect();
        assert_eq!(rec.field_names(&ignore).into_iter().collect::<Vec<_>>(), vec!["a"]);
    }
}
