//! Clasificación heurística de errores por tipo declarado y mensaje.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Severidad asignada a un error clasificado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Clase de error usada para elegir estrategia y para agrupar el circuit
/// breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Critical,
    Connection,
    Timeout,
    Validation,
    Conflict,
    Unknown,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::Unknown => "unknown",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::Critical => Severity::Critical,
            Self::Connection => Severity::High,
            Self::Timeout | Self::Unknown => Severity::Medium,
            Self::Validation | Self::Conflict => Severity::Low,
        }
    }
}

const CONNECTION_HINTS: &[&str] = &["connection", "connect", "network", "refused", "unreachable", "unavailable", "socket", "dns", "reset by peer"];
const TIMEOUT_HINTS: &[&str] = &["timeout", "timed out", "deadline"];
const VALIDATION_HINTS: &[&str] = &["validation", "invalid", "malformed", "schema", "parse", "missing field"];
const CONFLICT_HINTS: &[&str] = &["conflict", "divergent"];

#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    critical_types: BTreeSet<String>,
}

impl ErrorClassifier {
    /// `critical_types` se compara sin distinguir mayúsculas contra el tipo
    /// declarado del error.
    pub fn new<I, S>(critical_types: I) -> Self
        where I: IntoIterator<Item = S>,
              S: AsRef<str>
    {
        Self { critical_types: critical_types.into_iter()
                                             .map(|s| s.as_ref().trim().to_lowercase())
                                             .filter(|s| !s.is_empty())
                                             .collect() }
    }

    /// El tipo declarado tiene prioridad sobre el mensaje: sólo si el tipo no
    /// da pistas se inspecciona el texto.
    pub fn classify(&self, kind: &str, message: &str) -> ErrorClass {
        let kind = kind.to_lowercase();
        if self.critical_types.contains(&kind) {
            return ErrorClass::Critical;
        }
        match_hints(&kind).or_else(|| match_hints(&message.to_lowercase()))
                          .unwrap_or(ErrorClass::Unknown)
    }
}

fn match_hints(text: &str) -> Option<ErrorClass> {
    let hit = |hints: &[&str]| hints.iter().any(|h| text.contains(h));
    // timeout antes que connection: "connection timed out" es un timeout.
    if hit(TIMEOUT_HINTS) {
        Some(ErrorClass::Timeout)
    } else if hit(CONNECTION_HINTS) {
        Some(ErrorClass::Connection)
    } else if hit(VALIDATION_HINTS) {
        Some(ErrorClass::Validation)
    } else if hit(CONFLICT_HINTS) {
        Some(ErrorClass::Conflict)
    } else {
        None
    }
}
