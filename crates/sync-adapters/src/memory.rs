//! Conector en memoria para tests y la demo.
//!
//! Los registros se guardan por `record_id`. `fail_next_fetches` y
//! `fail_next_writes` inyectan fallos de conexión para ejercitar el
//! Recovery System.
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::Instant;
use sync_core::locks;
use sync_domain::ChangeRecord;

use crate::connector::{Batch, Connector, FetchRequest, SyncResult, WriteMode};
use crate::errors::ConnectorError;

/// Orden entre valores JSON comparables (números o strings). `None` si los
/// tipos no se pueden comparar.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

pub struct InMemoryConnector {
    name: String,
    records: Mutex<BTreeMap<String, ChangeRecord>>,
    fail_fetches: AtomicU32,
    fail_writes: AtomicU32,
    fetch_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

impl InMemoryConnector {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(),
               records: Mutex::new(BTreeMap::new()),
               fail_fetches: AtomicU32::new(0),
               fail_writes: AtomicU32::new(0),
               fetch_calls: AtomicUsize::new(0),
               write_calls: AtomicUsize::new(0) }
    }

    pub fn with_records(self, records: impl IntoIterator<Item = ChangeRecord>) -> Self {
        self.seed(records);
        self
    }

    pub fn seed(&self, records: impl IntoIterator<Item = ChangeRecord>) {
        let mut guard = locks::lock(&self.records);
        for r in records {
            guard.insert(r.record_id.clone(), r);
        }
    }

    pub fn fail_next_fetches(&self, n: u32) {
        self.fail_fetches.store(n, AtomicOrdering::SeqCst);
    }

    pub fn fail_next_writes(&self, n: u32) {
        self.fail_writes.store(n, AtomicOrdering::SeqCst);
    }

    pub fn get(&self, record_id: &str) -> Option<ChangeRecord> {
        locks::lock(&self.records).get(record_id).cloned()
    }

    pub fn len(&self) -> usize {
        locks::lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(AtomicOrdering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(AtomicOrdering::SeqCst)
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter.fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| n.checked_sub(1))
               .is_ok()
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Batch, ConnectorError> {
        self.fetch_calls.fetch_add(1, AtomicOrdering::SeqCst);
        if Self::take_failure(&self.fail_fetches) {
            return Err(ConnectorError::Unavailable(self.name.clone(), "connection refused".into()));
        }
        let mut matching: Vec<ChangeRecord> =
            locks::lock(&self.records).values()
                                      .filter(|r| request.filters.iter().all(|(k, v)| r.field(k) == Some(v)))
                                      .filter(|r| match (&request.incremental_field, &request.incremental_value) {
                                          (Some(f), Some(after)) => r.field(f)
                                                                     .and_then(|v| compare_values(v, after))
                                                                     .is_some_and(|o| o == Ordering::Greater),
                                          _ => true,
                                      })
                                      .cloned()
                                      .collect();
        if let Some(f) = &request.incremental_field {
            matching.sort_by(|a, b| match (a.field(f), b.field(f)) {
                        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                        _ => Ordering::Equal,
                    });
        }
        let total_count = matching.len();
        let limit = if request.limit == 0 { total_count } else { request.limit };
        let records: Vec<ChangeRecord> = matching.into_iter().skip(request.offset).take(limit).collect();
        let has_more = request.offset + records.len() < total_count;
        Ok(Batch { records,
                   total_count,
                   offset: request.offset,
                   has_more })
    }

    async fn write(&self, batch: &[ChangeRecord], mode: WriteMode) -> Result<SyncResult, ConnectorError> {
        self.write_calls.fetch_add(1, AtomicOrdering::SeqCst);
        if Self::take_failure(&self.fail_writes) {
            return Err(ConnectorError::Unavailable(self.name.clone(), "connection reset".into()));
        }
        let started = Instant::now();
        let mut result = SyncResult::default();
        let mut records = locks::lock(&self.records);
        if mode == WriteMode::Replace {
            records.clear();
        }
        for rec in batch {
            result.records_processed += 1;
            if rec.deleted {
                if records.remove(&rec.record_id).is_some() {
                    result.deleted += 1;
                }
                continue;
            }
            let exists = records.contains_key(&rec.record_id);
            match (mode, exists) {
                (WriteMode::Insert, true) => {
                    result.failed += 1;
                    result.errors.push(format!("record '{}' already exists", rec.record_id));
                }
                (_, true) => {
                    records.insert(rec.record_id.clone(), rec.clone());
                    result.updated += 1;
                }
                (_, false) => {
                    records.insert(rec.record_id.clone(), rec.clone());
                    result.inserted += 1;
                }
            }
        }
        result.duration_seconds = started.elapsed().as_secs_f64();
        Ok(result)
    }

    async fn test_connection(&self) -> bool {
        self.fail_fetches.load(AtomicOrdering::SeqCst) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(id: &str, seq: i64) -> ChangeRecord {
        ChangeRecord::from_json(id, "mem", json!({ "seq": seq, "v": id })).unwrap()
    }

    #[tokio::test]
    async fn incremental_fetch_pages_in_field_order() {
        let conn = InMemoryConnector::new("src").with_records([rec("c", 3), rec("a", 1), rec("b", 2), rec("d", 4)]);
        let req = FetchRequest::page(2, 0).incremental("seq", Some(json!(1)));
        let first = conn.fetch(&req).await.unwrap();
        assert_eq!(first.total_count, 3);
        assert!(first.has_more);
        assert_eq!(first.records.iter().map(|r| r.record_id.as_str()).collect::<Vec<_>>(), vec!["b", "c"]);
        let second = conn.fetch(&FetchRequest { offset: 2, ..req }).await.unwrap();
        assert_eq!(second.records.len(), 1);
        assert!(!second.has_more);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let conn = InMemoryConnector::new("src");
        conn.fail_next_fetches(1);
        assert!(!conn.test_connection().await);
        assert!(conn.fetch(&FetchRequest::default()).await.is_err());
        assert!(conn.fetch(&FetchRequest::default()).await.is_ok());
        assert_eq!(conn.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn insert_mode_rejects_existing_and_deletes_apply() {
        let conn = InMemoryConnector::new("dst").with_records([rec("a", 1)]);
        let out = conn.write(&[rec("a", 2), rec("b", 1)], WriteMode::Insert).await.unwrap();
        assert_eq!((out.inserted, out.failed), (1, 1));
        let out = conn.write(&[rec("a", 1).deleted()], WriteMode::Upsert).await.unwrap();
        assert_eq!(out.deleted, 1);
        assert!(conn.get("a").is_none());
    }
}
