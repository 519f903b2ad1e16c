//! Change Detector.
//!
//! `compare` es una función pura sobre dos versiones de un registro; el único
//! estado compartido es la cache acotada de resultados. La detección de
//! conflictos se calcula sobre el diff completo de campos, O(n) en el número
//! de campos, e independiente del orden de los argumentos. `Checksum` y
//! `HashBased` comparan primero el digest y sólo hacen el diff si difiere.
use ahash::RandomState;
use chrono::{DateTime, Utc};
use log::debug;
use rayon::prelude::*;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::time::Duration;
use sync_core::hashing::to_canonical_json;

use crate::cache::{BoundedCache, CacheStats};
use crate::comparison::{ComparisonResult, ComparisonStrategy, ConflictKind, DetectedConflict, DetectorConfig};
use crate::record::{ChangeKind, DataVersion, FieldChange};
use crate::DomainError;

// Semillas fijas: el checksum debe ser estable entre procesos.
const CHECKSUM_SEEDS: (u64, u64, u64, u64) =
    (0x243f_6a88_85a3_08d3, 0x1319_8a2e_0370_7344, 0xa409_3822_299f_31d0, 0x082e_fa98_ec4e_6c89);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    strategy: ComparisonStrategy,
    table: Option<String>,
    id_a: String,
    id_b: String,
    hash_a: u64,
    hash_b: u64,
}

struct FieldDiff {
    changes: Vec<FieldChange>,
    matching: usize,
    total: usize,
}

impl FieldDiff {
    fn similarity(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.matching as f64 / self.total as f64
        }
    }
}

pub struct ChangeDetector {
    config: DetectorConfig,
    cache: BoundedCache<CacheKey, ComparisonResult>,
    pool: rayon::ThreadPool,
    checksum_state: RandomState,
}

impl ChangeDetector {
    pub fn new(config: DetectorConfig) -> Result<Self, DomainError> {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(config.detection_workers.max(1))
                                                  .thread_name(|i| format!("change-detector-{i}"))
                                                  .build()?;
        let (k0, k1, k2, k3) = CHECKSUM_SEEDS;
        Ok(Self { cache: BoundedCache::new(config.cache_capacity),
                  config,
                  pool,
                  checksum_state: RandomState::with_seeds(k0, k1, k2, k3) })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn compare(&self, strategy: ComparisonStrategy, a: &DataVersion, b: &DataVersion) -> ComparisonResult {
        self.compare_cached(strategy, None, a, b)
    }

    /// Compara con la estrategia configurada para `table`.
    pub fn compare_for_table(&self, table: &str, a: &DataVersion, b: &DataVersion) -> ComparisonResult {
        self.compare_cached(self.config.strategy_for(Some(table)), Some(table), a, b)
    }

    /// Compara N pares en el pool de detección. El resultado conserva el orden
    /// de entrada.
    pub fn detect_batch(&self, table: Option<&str>, pairs: &[(DataVersion, DataVersion)]) -> Vec<ComparisonResult> {
        let strategy = self.config.strategy_for(table);
        debug!("batch detection of {} pairs with {}", pairs.len(), strategy.as_str());
        self.pool
            .install(|| pairs.par_iter().map(|(a, b)| self.compare_cached(strategy, table, a, b)).collect())
    }

    /// Sólo los conflictos, útil cuando no interesa el detalle del diff.
    pub fn detect_conflicts(&self, a: &DataVersion, b: &DataVersion) -> Vec<DetectedConflict> {
        let diff = self.field_diff(a, b, None);
        self.conflicts(a, b, &diff)
    }

    fn compare_cached(&self,
                      strategy: ComparisonStrategy,
                      table: Option<&str>,
                      a: &DataVersion,
                      b: &DataVersion)
                      -> ComparisonResult {
        let key = CacheKey { strategy,
                             table: table.map(str::to_string),
                             id_a: a.record_id.clone(),
                             id_b: b.record_id.clone(),
                             hash_a: self.fingerprint(a),
                             hash_b: self.fingerprint(b) };
        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }
        let result = self.evaluate(strategy, table, a, b);
        self.cache.insert(key, result.clone());
        result
    }

    fn evaluate(&self, strategy: ComparisonStrategy, table: Option<&str>, a: &DataVersion, b: &DataVersion) -> ComparisonResult {
        if a.deleted || b.deleted {
            let diff = self.field_diff(a, b, None);
            let conflicts = self.conflicts(a, b, &diff);
            let equal = a.deleted == b.deleted;
            return ComparisonResult { equal,
                                      similarity: if equal { 1.0 } else { 0.0 },
                                      changes: if equal { Vec::new() } else { diff.changes },
                                      conflicts,
                                      confidence: 1.0,
                                      strategy };
        }

        // Pre-filtro por digest: si coincide no se hace diff; con payloads
        // iguales sólo la versión puede seguir en conflicto.
        let hash_fields = self.hash_fields(table);
        let digest_match = match strategy {
            ComparisonStrategy::Checksum => Some((self.checksum(a) == self.checksum(b), 0.99)),
            ComparisonStrategy::HashBased => {
                Some((self.content_hash(a, hash_fields) == self.content_hash(b, hash_fields), 1.0))
            }
            _ => None,
        };
        if let Some((true, confidence)) = digest_match {
            return ComparisonResult { equal: true,
                                      similarity: 1.0,
                                      changes: Vec::new(),
                                      conflicts: self.version_conflict(a, b).into_iter().collect(),
                                      confidence,
                                      strategy };
        }

        let diff = self.field_diff(a, b, None);
        let conflicts = self.conflicts(a, b, &diff);
        let similarity = diff.similarity();
        let unchanged = |confidence: f64| ComparisonResult { equal: true,
                                                             similarity: 1.0,
                                                             changes: Vec::new(),
                                                             conflicts: conflicts.clone(),
                                                             confidence,
                                                             strategy };
        let (equal, changes, confidence) = match strategy {
            ComparisonStrategy::FieldLevel | ComparisonStrategy::Checksum => (diff.changes.is_empty(), diff.changes, 1.0),
            ComparisonStrategy::HashBased => {
                // El hash sólo decide; el detalle viene del diff por campos.
                let detail = match hash_fields {
                    Some(_) => self.field_diff(a, b, hash_fields).changes,
                    None => diff.changes,
                };
                (false, detail, 1.0)
            }
            ComparisonStrategy::TimestampBased => match (self.timestamp_of(a), self.timestamp_of(b)) {
                (Some(x), Some(y)) if abs_diff(x, y) <= self.config.timestamp_tolerance => return unchanged(0.8),
                (Some(_), Some(_)) => (diff.changes.is_empty(), diff.changes, 0.9),
                _ => (diff.changes.is_empty(), diff.changes, 0.7),
            },
            ComparisonStrategy::VersionBased => match (self.version_of(a), self.version_of(b)) {
                (Some(x), Some(y)) if x == y => return unchanged(0.95),
                (Some(_), Some(_)) => (false, diff.changes, 0.95),
                _ => (diff.changes.is_empty(), diff.changes, 0.7),
            },
        };
        ComparisonResult { equal,
                           similarity: if equal { 1.0 } else { similarity },
                           changes,
                           conflicts,
                           confidence,
                           strategy }
    }

    fn field_diff(&self, a: &DataVersion, b: &DataVersion, only: Option<&[String]>) -> FieldDiff {
        let ignore = &self.config.ignore_fields;
        let mut names: BTreeSet<&str> = a.field_names(ignore);
        names.extend(b.field_names(ignore));
        if let Some(only) = only {
            names.retain(|n| only.iter().any(|o| o.as_str() == *n));
        }
        let mut changes = Vec::new();
        let mut matching = 0;
        for name in &names {
            let change = match (a.field(name), b.field(name)) {
                (Some(x), Some(y)) if x == y => {
                    matching += 1;
                    continue;
                }
                (Some(x), Some(y)) => (ChangeKind::Modified, Some(x.clone()), Some(y.clone())),
                (None, Some(y)) => (ChangeKind::Added, None, Some(y.clone())),
                (Some(x), None) => (ChangeKind::Removed, Some(x.clone()), None),
                (None, None) => continue,
            };
            changes.push(FieldChange { field: name.to_string(),
                                       kind: change.0,
                                       old: change.1,
                                       new: change.2 });
        }
        FieldDiff { changes,
                    matching,
                    total: names.len() }
    }

    /// Delete corta la detección: si un lado está borrado sólo se informa ese
    /// conflicto.
    fn conflicts(&self, a: &DataVersion, b: &DataVersion, diff: &FieldDiff) -> Vec<DetectedConflict> {
        let record_id = a.record_id.clone();
        if a.deleted != b.deleted {
            return vec![DetectedConflict { kind: ConflictKind::Delete,
                                           record_id,
                                           fields: Vec::new(),
                                           description: "record deleted on one side only".into() }];
        }
        let mut out: Vec<DetectedConflict> = self.version_conflict(a, b).into_iter().collect();

        if let (Some(x), Some(y)) = (self.timestamp_of(a), self.timestamp_of(b)) {
            if abs_diff(x, y) < self.config.concurrent_update_tolerance {
                let fields: Vec<String> =
                    diff.changes
                        .iter()
                        .filter(|c| c.kind == ChangeKind::Modified)
                        .filter(|c| Some(&c.field) != self.config.timestamp_field.as_ref())
                        .filter(|c| Some(&c.field) != self.config.version_field.as_ref())
                        .map(|c| c.field.clone())
                        .collect();
                if !fields.is_empty() {
                    out.push(DetectedConflict { kind: ConflictKind::Content,
                                                record_id: record_id.clone(),
                                                fields,
                                                description: "concurrent updates with different values".into() });
                }
            }
        }

        let schema: Vec<String> = diff.changes
                                      .iter()
                                      .filter(|c| c.kind != ChangeKind::Modified)
                                      .map(|c| c.field.clone())
                                      .collect();
        if !schema.is_empty() {
            out.push(DetectedConflict { kind: ConflictKind::Schema,
                                        record_id,
                                        fields: schema,
                                        description: "field sets differ".into() });
        }
        out
    }

    fn version_conflict(&self, a: &DataVersion, b: &DataVersion) -> Option<DetectedConflict> {
        match (self.version_of(a), self.version_of(b)) {
            (Some(x), Some(y)) if x != y => {
                let field = self.config.version_field.clone().unwrap_or_else(|| "version".into());
                Some(DetectedConflict { kind: ConflictKind::Version,
                                        record_id: a.record_id.clone(),
                                        fields: vec![field],
                                        description: "version tokens differ".into() })
            }
            _ => None,
        }
    }

    fn hash_fields(&self, table: Option<&str>) -> Option<&[String]> {
        table.and_then(|t| self.config.hash_fields.get(t))
             .filter(|f| !f.is_empty())
             .map(Vec::as_slice)
    }

    fn selected(&self, rec: &DataVersion, only: Option<&[String]>) -> Value {
        let map: Map<String, Value> =
            rec.payload
               .iter()
               .filter(|(k, _)| !self.config.ignore_fields.contains(*k))
               .filter(|(k, _)| only.map_or(true, |o| o.iter().any(|f| f == *k)))
               .map(|(k, v)| (k.clone(), v.clone()))
               .collect();
        Value::Object(map)
    }

    fn content_hash(&self, rec: &DataVersion, only: Option<&[String]>) -> String {
        let canonical = to_canonical_json(&self.selected(rec, only));
        format!("{:x}", Sha256::digest(canonical.as_bytes()))
    }

    fn checksum(&self, rec: &DataVersion) -> u64 {
        self.checksum_state.hash_one(to_canonical_json(&self.selected(rec, None)))
    }

    /// Huella completa para la clave de cache (payload, versión, timestamp,
    /// borrado).
    fn fingerprint(&self, rec: &DataVersion) -> u64 {
        self.checksum_state.hash_one((to_canonical_json(&rec.payload_value()),
                                      rec.version.as_deref(),
                                      rec.timestamp.map(|t| t.timestamp_micros()),
                                      rec.deleted))
    }

    fn timestamp_of(&self, rec: &DataVersion) -> Option<DateTime<Utc>> {
        self.config
            .timestamp_field
            .as_deref()
            .and_then(|f| rec.field(f))
            .and_then(parse_timestamp)
            .or(rec.timestamp)
    }

    fn version_of(&self, rec: &DataVersion) -> Option<String> {
        let from_payload = self.config.version_field.as_deref().and_then(|f| rec.field(f)).map(|v| match v {
                                                                                                  Value::String(s) => s.clone(),
                                                                                                  other => other.to_string(),
                                                                                              });
        from_payload.or_else(|| rec.version.clone())
    }
}

fn abs_diff(x: DateTime<Utc>, y: DateTime<Utc>) -> Duration {
    Duration::from_millis((x - y).num_milliseconds().unsigned_abs())
}

/// RFC 3339 o segundos epoch.
fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}
