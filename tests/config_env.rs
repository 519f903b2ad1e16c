use std::collections::HashMap;
use syncflow::{SyncConfig, SyncRuntime};

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn runtime_builds_from_looked_up_config() {
    let env = vars(&[("SYNC_MAX_CONCURRENCY", "2"), ("SYNC_DETECTION_WORKERS", "3"), ("SYNC_CHECKPOINT_RETENTION_DAYS", "7")]);
    let cfg = SyncConfig::from_lookup(|k| env.get(k).cloned());
    assert_eq!(cfg.orchestrator.max_concurrency, 2);
    assert_eq!(cfg.detector.detection_workers, 3);
    assert_eq!(cfg.recovery.checkpoint_retention_days, 7);

    let rt = SyncRuntime::new(cfg).unwrap();
    assert_eq!(rt.orchestrator().config().max_concurrency, 2);
    assert_eq!(rt.detector().config().detection_workers, 3);
}

#[test]
fn without_database_url_postgres_falls_back_to_memory() {
    let cfg = SyncConfig::from_lookup(|_| None);
    assert!(cfg.database.is_none());
    let rt = SyncRuntime::with_postgres(cfg).unwrap();
    let summary = tokio_test::block_on(async { rt.checkpoint_summary() }).unwrap();
    assert_eq!(summary.total, 0);
}

#[test]
fn config_round_trips_through_json() {
    let cfg = SyncConfig::default();
    let text = serde_json::to_string(&cfg).unwrap();
    let back: SyncConfig = serde_json::from_str(&text).unwrap();
    assert_eq!(back, cfg);
}
