use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use sync_adapters::{ConnectorRegistry, ExtractHandler, InMemoryConnector, LoadHandler, TransformHandler};
use sync_core::{CheckpointKind, Orchestrator, RecoverySystem, WorkflowDefinition, WorkflowStatus, WorkflowStep};
use serde_json::Map;
use sync_domain::{ChangeDetector, ChangeRecord, ComparisonStrategy, DetectorConfig};
use sync_policies::{ConflictResolver, ConflictStatus, ResolutionPolicy, ResolutionStrategy};

struct Fixture {
    orch: Orchestrator,
    source: Arc<InMemoryConnector>,
    target: Arc<InMemoryConnector>,
    resolver: Arc<ConflictResolver>,
}

fn customer(id: &str, seq: i64, email: &str) -> ChangeRecord {
    ChangeRecord::from_json(id, "crm", json!({ "seq": seq, "email": email })).unwrap()
}

fn fixture() -> Fixture {
    fixture_with(DetectorConfig::default(), ResolutionPolicy::default())
}

fn fixture_with(detection: DetectorConfig, policy: ResolutionPolicy) -> Fixture {
    let recovery = Arc::new(RecoverySystem::default());
    let orch = Orchestrator::builder().recovery(Arc::clone(&recovery)).build();
    let source = Arc::new(InMemoryConnector::new("crm"));
    let target = Arc::new(InMemoryConnector::new("warehouse"));
    let connectors = Arc::new(ConnectorRegistry::new());
    connectors.register(source.clone());
    connectors.register(target.clone());
    let detector = Arc::new(ChangeDetector::new(detection).unwrap());
    let resolver = Arc::new(ConflictResolver::new(policy));

    orch.register_step_handler("extract", Arc::new(ExtractHandler::new(Arc::clone(&connectors), Arc::clone(&recovery))));
    orch.register_step_handler("transform",
                               Arc::new(TransformHandler::new(Arc::clone(&connectors), detector, Arc::clone(&resolver))));
    orch.register_step_handler("load", Arc::new(LoadHandler::new(Arc::clone(&connectors), Arc::clone(&recovery))));
    orch.register(WorkflowDefinition::new("customers-etl",
                                          "customers",
                                          vec![WorkflowStep::new("extract", "extract").with_action("customers")
                                                                                      .with_params(json!({
                                                                                          "connector": "crm",
                                                                                          "incremental_field": "seq",
                                                                                          "batch_size": 2,
                                                                                      })),
                                               WorkflowStep::new("transform", "transform").with_action("customers")
                                                                                          .depends_on(["extract"])
                                                                                          .with_params(json!({ "target": "warehouse" })),
                                               WorkflowStep::new("load", "load").with_action("customers")
                                                                                .depends_on(["transform"])
                                                                                .with_params(json!({ "connector": "warehouse" }))]))
        .unwrap();
    Fixture { orch,
              source,
              target,
              resolver }
}

#[tokio::test]
async fn test_incremental_rerun_only_reads_new_records() {
    let fx = fixture();
    fx.source.seed([customer("c1", 1, "a@x.io"), customer("c2", 2, "b@x.io"), customer("c3", 3, "c@x.io")]);

    let first = fx.orch.execute_job("customers-etl", "nightly", json!({})).unwrap();
    let first = fx.orch.wait(first).await.unwrap();
    assert_eq!(first.status, WorkflowStatus::Completed);
    assert_eq!(fx.target.len(), 3);
    assert_eq!(first.step("extract").unwrap().records_processed, 3);

    let cp = fx.orch
               .recovery()
               .find_latest_checkpoint("nightly", Some("customers"), Some(CheckpointKind::Table))
               .unwrap()
               .expect("table checkpoint");
    assert_eq!(cp.position, json!({ "incremental_field": "seq", "value": 3 }));

    fx.source.seed([customer("c4", 4, "d@x.io")]);
    let second = fx.orch.execute_job("customers-etl", "nightly", json!({})).unwrap();
    let second = fx.orch.wait(second).await.unwrap();
    assert_eq!(second.status, WorkflowStatus::Completed);
    assert_eq!(second.step("extract").unwrap().records_processed, 1);
    assert_eq!(second.step("load").unwrap().records_processed, 1);
    assert_eq!(fx.target.len(), 4);
}

#[tokio::test]
async fn test_concurrent_edit_is_resolved_last_write_wins() {
    let fx = fixture();
    let now = Utc::now();
    fx.source.seed([customer("c1", 1, "new@x.io").with_timestamp(now)]);
    fx.target.seed([ChangeRecord::from_json("c1", "warehouse", json!({ "seq": 1, "email": "old@x.io" })).unwrap()
                                                                                                     .with_timestamp(now - Duration::seconds(2))]);

    let result = fx.orch.execute_and_wait("customers-etl", json!({})).await.unwrap();
    assert_eq!(result.status, WorkflowStatus::Completed);

    let conflicts = fx.resolver.conflicts_by_table("customers");
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].status, ConflictStatus::Resolved);
    assert_eq!(conflicts[0].resolution.as_ref().unwrap().strategy, ResolutionStrategy::LastWriteWins);
    assert_eq!(fx.target.get("c1").unwrap().field("email"), Some(&json!("new@x.io")));
}

#[tokio::test]
async fn test_connection_failure_is_retried_by_recovery() {
    let fx = fixture();
    fx.source.seed([customer("c1", 1, "a@x.io")]);
    fx.source.fail_next_fetches(1);

    let result = fx.orch.execute_and_wait("customers-etl", json!({})).await.unwrap();
    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.step("extract").unwrap().retry_count, 1);
    assert_eq!(fx.source.fetch_calls(), 2);
    assert_eq!(fx.target.len(), 1);
}

fn table_position(fx: &Fixture, job: &str) -> serde_json::Value {
    fx.orch
      .recovery()
      .find_latest_checkpoint(job, Some("customers"), Some(CheckpointKind::Table))
      .unwrap()
      .expect("table checkpoint")
      .position["value"]
      .clone()
}

#[tokio::test]
async fn test_equal_timestamps_with_diverging_values_reach_the_resolver() {
    let mut detection = DetectorConfig::default();
    detection.table_strategies.insert("customers".into(), ComparisonStrategy::TimestampBased);
    let fx = fixture_with(detection, ResolutionPolicy::default());
    let now = Utc::now();
    fx.source.seed([customer("c1", 1, "new").with_timestamp(now)]);
    fx.target.seed([ChangeRecord::from_json("c1", "warehouse", json!({ "seq": 1, "email": "old" })).unwrap()
                                                                                                  .with_timestamp(now)]);

    let result = fx.orch.execute_and_wait("customers-etl", json!({})).await.unwrap();
    assert_eq!(result.status, WorkflowStatus::Completed);

    assert_eq!(fx.resolver.stats().total.detected, 1);
    let conflicts = fx.resolver.conflicts_by_table("customers");
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].status, ConflictStatus::Resolved);
    assert_eq!(conflicts[0].fields, vec!["email".to_string()]);
    // Empate de timestamps: last-write-wins se queda con source.
    assert_eq!(fx.target.get("c1").unwrap().field("email"), Some(&json!("new")));
}

#[tokio::test]
async fn test_pending_manual_record_is_reread_and_written_once_decided() {
    let fx = fixture_with(DetectorConfig::default(), ResolutionPolicy::default().with_default(ResolutionStrategy::Manual));
    let now = Utc::now();
    fx.source.seed([customer("c0", 2, "a@x.io"),
                    customer("c1", 5, "new@x.io").with_timestamp(now),
                    customer("c9", 9, "z@x.io")]);
    fx.target.seed([ChangeRecord::from_json("c1", "warehouse", json!({ "seq": 5, "email": "old@x.io" })).unwrap()
                                                                                                     .with_timestamp(now)]);

    let first = fx.orch.execute_job("customers-etl", "nightly", json!({})).unwrap();
    assert_eq!(fx.orch.wait(first).await.unwrap().status, WorkflowStatus::Completed);
    assert_eq!(fx.target.len(), 3);
    assert_eq!(fx.target.get("c1").unwrap().field("email"), Some(&json!("old@x.io")));
    assert_eq!(fx.resolver.pending_manual().len(), 1);
    // c9 ya está escrito, pero la marca no pasa de c1 (seq 5).
    assert_eq!(table_position(&fx, "nightly"), json!(2));

    // Sin decisión: se vuelve a leer c1 y no se abre un conflicto duplicado.
    let second = fx.orch.execute_job("customers-etl", "nightly", json!({})).unwrap();
    let second = fx.orch.wait(second).await.unwrap();
    assert_eq!(second.status, WorkflowStatus::Completed);
    assert_eq!(second.step("extract").unwrap().records_processed, 2);
    assert_eq!(fx.resolver.conflicts_by_table("customers").len(), 1);
    assert_eq!(table_position(&fx, "nightly"), json!(2));

    let pending = fx.resolver.pending_manual().remove(0);
    let mut data = Map::new();
    data.insert("seq".into(), json!(5));
    data.insert("email".into(), json!("fixed@x.io"));
    fx.resolver.resolve_manually(pending.id, data, "ana", "confirmed with the customer").unwrap();

    let third = fx.orch.execute_job("customers-etl", "nightly", json!({})).unwrap();
    assert_eq!(fx.orch.wait(third).await.unwrap().status, WorkflowStatus::Completed);
    assert_eq!(fx.target.get("c1").unwrap().field("email"), Some(&json!("fixed@x.io")));
    assert_eq!(table_position(&fx, "nightly"), json!(9));
    let conflicts = fx.resolver.conflicts_by_table("customers");
    assert_eq!(conflicts.len(), 1);
    assert!(conflicts[0].applied_at.is_some());
    assert!(fx.resolver.manual_decision("customers", "c1").is_none());
}
