use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sync_adapters::InMemoryConnector;
use sync_core::{handler_fn, NamedEvent, RetryConfig, StepError, StepOutput, StepStatus, WorkflowDefinition, WorkflowStatus,
                WorkflowStep};
use sync_domain::ChangeRecord;
use sync_policies::{ConflictEvent, ConflictStatus, ResolutionStrategy};
use syncflow::{EtlSpec, SyncConfig, SyncRuntime};

fn customer(id: &str, origin: &str, seq: i64, email: &str) -> ChangeRecord {
    ChangeRecord::from_json(id, origin, json!({ "seq": seq, "email": email })).unwrap()
}

fn runtime_with_connectors() -> (SyncRuntime, Arc<InMemoryConnector>, Arc<InMemoryConnector>) {
    let rt = SyncRuntime::new(SyncConfig::default()).unwrap();
    let crm = Arc::new(InMemoryConnector::new("crm"));
    let warehouse = Arc::new(InMemoryConnector::new("warehouse"));
    rt.register_connector(crm.clone());
    rt.register_connector(warehouse.clone());
    rt.register_etl(&EtlSpec::new("customers-etl", "customers", "crm", "warehouse").incremental("seq"))
      .unwrap();
    (rt, crm, warehouse)
}

#[tokio::test]
async fn etl_with_field_conflict_resolves_last_write_wins() {
    let (rt, crm, warehouse) = runtime_with_connectors();
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&seen);
    rt.resolver().subscribe(Arc::new(move |ev: &ConflictEvent| -> Result<(), String> {
                               sink.lock().unwrap().push(ev.name().to_string());
                               Ok(())
                           }));

    let now = Utc::now();
    crm.seed([customer("c1", "crm", 1, "new@x.io").with_timestamp(now), customer("c2", "crm", 2, "b@x.io")]);
    warehouse.seed([customer("c1", "warehouse", 1, "old@x.io").with_timestamp(now - ChronoDuration::seconds(2))]);

    let result = rt.orchestrator().execute_and_wait("customers-etl", json!({})).await.unwrap();
    assert_eq!(result.status, WorkflowStatus::Completed);

    let conflicts = rt.conflicts_by_table("customers");
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].status, ConflictStatus::Resolved);
    let strategy = conflicts[0].resolution.as_ref().unwrap().strategy;
    assert_eq!(strategy, ResolutionStrategy::LastWriteWins);
    assert_eq!(serde_json::to_value(strategy).unwrap(), json!("last_write_wins"));
    assert_eq!(warehouse.get("c1").unwrap().field("email"), Some(&json!("new@x.io")));
    assert_eq!(warehouse.len(), 2);

    assert_eq!(*seen.lock().unwrap(), vec!["conflict.detected".to_string(), "conflict.resolved".to_string()]);
    assert_eq!(rt.gate_history(Some("customers")).len(), 1);
    assert!(rt.pending_conflicts().is_empty());
}

#[tokio::test]
async fn dependent_step_waits_for_retried_connection_failure() {
    let rt = SyncRuntime::new(SyncConfig::default()).unwrap();
    let orch = rt.orchestrator();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    orch.register_step_handler("flaky",
                               handler_fn(move |_s, _c| {
                                   let n = c.fetch_add(1, Ordering::SeqCst);
                                   async move {
                                       if n == 0 {
                                           Err(StepError::new("ConnectionRefused", "connection refused by upstream"))
                                       } else {
                                           Ok(StepOutput::new(json!({ "rows": 10 })).with_records(10))
                                       }
                                   }
                               }));
    orch.register_step_handler("after", handler_fn(|_s, _c| async move { Ok(StepOutput::new(json!("ok"))) }));
    let retry = RetryConfig::exponential(3, Duration::from_millis(2), Duration::from_millis(20));
    orch.register(WorkflowDefinition::new("two",
                                          "two",
                                          vec![WorkflowStep::new("one", "flaky").with_retry(retry),
                                               WorkflowStep::new("two", "after").depends_on(["one"])]))
        .unwrap();

    let result = orch.execute_and_wait("two", json!({})).await.unwrap();
    assert_eq!(result.status, WorkflowStatus::Completed);
    let one = result.step("one").unwrap();
    let two = result.step("two").unwrap();
    assert_eq!(one.retry_count, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(two.started_at.unwrap() >= one.finished_at.unwrap());

    let summary = rt.error_summary();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.by_strategy.get("exponential_backoff"), Some(&1));
}

#[tokio::test]
async fn pause_and_resume_through_runtime() {
    let rt = SyncRuntime::new(SyncConfig::default()).unwrap();
    let orch = rt.orchestrator();
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let runs = Arc::new(AtomicUsize::new(0));
    let (g, r) = (Arc::clone(&gate), Arc::clone(&runs));
    orch.register_step_handler("gated",
                               handler_fn(move |_s, _c| {
                                   let (g, r) = (Arc::clone(&g), Arc::clone(&r));
                                   async move {
                                       r.fetch_add(1, Ordering::SeqCst);
                                       match g.acquire().await {
                                           Ok(_permit) => Ok(StepOutput::new(json!("a"))),
                                           Err(e) => Err(StepError::new("gate", e.to_string())),
                                       }
                                   }
                               }));
    orch.register_step_handler("tail", handler_fn(|_s, _c| async move { Ok(StepOutput::new(json!("b"))) }));
    orch.register(WorkflowDefinition::new("pr",
                                          "pr",
                                          vec![WorkflowStep::new("a", "gated"),
                                               WorkflowStep::new("b", "tail").depends_on(["a"])]))
        .unwrap();

    let id = orch.execute("pr", json!({})).unwrap();
    while runs.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    orch.pause(id).unwrap();
    gate.add_permits(1);
    for _ in 0..200 {
        if rt.workflow_status(id).unwrap().step("a").map(|s| s.status) == Some(StepStatus::Completed) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    let paused = rt.workflow_status(id).unwrap();
    assert_eq!(paused.status, WorkflowStatus::Paused);
    assert_eq!(paused.step("b").unwrap().status, StepStatus::Pending);

    orch.resume(id).unwrap();
    let done = orch.wait(id).await.unwrap();
    assert_eq!(done.status, WorkflowStatus::Completed);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn admin_surface_reflects_runs() {
    let (rt, crm, _warehouse) = runtime_with_connectors();
    crm.seed([customer("c1", "crm", 1, "a@x.io")]);
    let id = rt.orchestrator().execute_job("customers-etl", "nightly", json!({})).unwrap();
    rt.orchestrator().wait(id).await.unwrap();

    let workflows = rt.list_workflows();
    assert_eq!(workflows.len(), 1);
    assert_eq!(workflows[0].step_count, 3);

    let checkpoints = rt.checkpoint_summary().unwrap();
    assert_eq!(checkpoints.by_kind.get("table"), Some(&1));
    assert!(checkpoints.by_job.contains_key("nightly"));

    let stats = rt.stats();
    assert_eq!(stats.connectors, vec!["crm".to_string(), "warehouse".to_string()]);
    assert_eq!(stats.orchestrator.executions_by_status.get("completed"), Some(&1));
    assert!(serde_json::to_value(&stats).is_ok());
}
