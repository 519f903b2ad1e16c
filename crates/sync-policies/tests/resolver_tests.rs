use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::{Arc, Mutex};
use sync_core::NamedEvent;
use sync_domain::{ChangeDetector, ConflictKind, DataVersion, DetectorConfig};
use sync_policies::{async_resolver, ConflictEvent, ConflictResolver, ConflictStatus, ResolutionPolicy, ResolutionStrategy,
                    ResolvedValue};

fn pair(email_s: &str, email_t: &str, gap_secs: i64) -> (DataVersion, DataVersion) {
    let now = Utc::now();
    let s = DataVersion::from_json("c-7", "crm", json!({"email": email_s, "name": "Ada"})).unwrap()
                                                                                          .with_timestamp(now);
    let t = DataVersion::from_json("c-7", "warehouse", json!({"email": email_t, "name": "Ada"})).unwrap()
                                                                                                .with_timestamp(now - Duration::seconds(gap_secs));
    (s, t)
}

#[tokio::test]
async fn test_detected_content_conflict_resolves_with_last_write_wins() {
    let detector = ChangeDetector::new(DetectorConfig::default()).unwrap();
    let resolver = ConflictResolver::default();
    let (s, t) = pair("new@x.io", "old@x.io", 2);

    let conflict = resolver.detect_and_register(&detector, "customers", s, t).expect("conflict expected");
    assert_eq!(conflict.kind, ConflictKind::Content);
    assert_eq!(conflict.fields, vec!["email".to_string()]);

    let out = resolver.resolve(conflict).await.unwrap();
    assert_eq!(out.status, ConflictStatus::Resolved);
    let res = out.resolution.clone().unwrap();
    assert_eq!(res.strategy, ResolutionStrategy::LastWriteWins);
    assert_eq!(serde_json::to_value(res.strategy).unwrap(), json!("last_write_wins"));
    assert_eq!(out.resolved_value().unwrap().data.as_ref().unwrap()["email"], json!("new@x.io"));

    let stats = resolver.stats();
    assert_eq!(stats.total.detected, 1);
    assert_eq!(stats.total.resolved, 1);
    assert_eq!(stats.by_table["customers"].resolution_rate(), 1.0);
    assert_eq!(stats.resolution_rate, 1.0);
}

#[tokio::test]
async fn test_no_conflict_outside_concurrency_window() {
    let detector = ChangeDetector::new(DetectorConfig::default()).unwrap();
    let resolver = ConflictResolver::default();
    let (s, t) = pair("new@x.io", "old@x.io", 60);
    assert!(resolver.detect_and_register(&detector, "customers", s, t).is_none());
    assert_eq!(resolver.stats().total.detected, 0);
}

#[tokio::test]
async fn test_delete_conflicts_default_to_manual_queue() {
    let detector = ChangeDetector::new(DetectorConfig::default()).unwrap();
    let resolver = ConflictResolver::default();
    let (s, t) = pair("a@x.io", "b@x.io", 1);
    let conflict = resolver.detect_and_register(&detector, "customers", s.deleted(), t).unwrap();
    assert_eq!(conflict.kind, ConflictKind::Delete);

    let out = resolver.resolve(conflict).await.unwrap();
    assert_eq!(out.status, ConflictStatus::PendingManual);
    assert_eq!(resolver.pending_manual()[0].id, out.id);
}

#[tokio::test]
async fn test_async_custom_resolver_and_listener_isolation() {
    let resolver = ConflictResolver::default();
    resolver.register_custom_resolver("ledger",
                                      async_resolver(|c| async move {
                                          let mut data = c.target.payload.clone();
                                          data.insert("reviewed".into(), json!(true));
                                          Ok(ResolvedValue::data(data, Some("custom".into())))
                                      }));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    resolver.subscribe(Arc::new(|_: &ConflictEvent| -> Result<(), String> { panic!("broken listener") }));
    resolver.subscribe(Arc::new(move |e: &ConflictEvent| -> Result<(), String> {
                                    sink.lock().unwrap().push(e.name());
                                    Ok(())
                                }));

    let (s, t) = pair("a@x.io", "b@x.io", 1);
    let conflict = sync_policies::Conflict::new("ledger", ConflictKind::Content, s, t);
    let out = resolver.resolve(conflict).await.unwrap();
    assert_eq!(out.status, ConflictStatus::Resolved);
    assert_eq!(out.resolution.as_ref().unwrap().strategy, ResolutionStrategy::Custom);
    assert_eq!(out.resolved_value().unwrap().data.as_ref().unwrap()["reviewed"], json!(true));
    assert_eq!(*seen.lock().unwrap(), vec!["conflict.detected", "conflict.resolved"]);
}

#[tokio::test]
async fn test_resolving_twice_is_rejected() {
    let resolver = ConflictResolver::new(ResolutionPolicy::default());
    let (s, t) = pair("a@x.io", "b@x.io", 1);
    let conflict = sync_policies::Conflict::new("t", ConflictKind::Content, s, t);
    let done = resolver.resolve(conflict.clone()).await.unwrap();
    assert_eq!(done.status, ConflictStatus::Resolved);
    assert!(resolver.resolve(conflict).await.is_err());
    assert_eq!(resolver.conflicts_by_table("t").len(), 1);
}
