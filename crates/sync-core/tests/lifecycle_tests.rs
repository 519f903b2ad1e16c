use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sync_core::{handler_fn, CheckpointKind, Orchestrator, OrchestratorConfig, StepError, StepOutput, StepStatus,
                WorkflowDefinition, WorkflowStatus, WorkflowStep};
use tokio::sync::Semaphore;

fn counting_ok(counter: Arc<AtomicUsize>) -> Arc<dyn sync_core::StepHandler> {
    handler_fn(move |step, _ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok(StepOutput::new(json!({ "from": step.id })).with_records(2)) }
    })
}

#[tokio::test]
async fn pause_holds_frontier_and_resume_continues_without_rerunning() {
    let orch = Orchestrator::default();
    let gate = Arc::new(Semaphore::new(0));
    let a_calls = Arc::new(AtomicUsize::new(0));
    let b_calls = Arc::new(AtomicUsize::new(0));
    let (g, a) = (Arc::clone(&gate), Arc::clone(&a_calls));
    orch.register_step_handler("gated",
                               handler_fn(move |_s, _c| {
                                   let (g, a) = (Arc::clone(&g), Arc::clone(&a));
                                   async move {
                                       a.fetch_add(1, Ordering::SeqCst);
                                       match g.acquire().await {
                                           Ok(_permit) => Ok(StepOutput::new(json!("a-done"))),
                                           Err(e) => Err(StepError::new("gate", e.to_string())),
                                       }
                                   }
                               }));
    orch.register_step_handler("count", counting_ok(Arc::clone(&b_calls)));
    orch.register(WorkflowDefinition::new("pr",
                                          "pr",
                                          vec![WorkflowStep::new("a", "gated"),
                                               WorkflowStep::new("b", "count").depends_on(["a"])]))
        .unwrap();

    let id = orch.execute("pr", json!({})).unwrap();
    while a_calls.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    orch.pause(id).unwrap();
    assert_eq!(orch.status(id).unwrap().status, WorkflowStatus::Paused);

    // El step en vuelo termina aunque la ejecución esté pausada.
    gate.add_permits(1);
    for _ in 0..200 {
        if orch.status(id).unwrap().step("a").map(|s| s.status) == Some(StepStatus::Completed) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(30)).await;
    let paused = orch.status(id).unwrap();
    assert_eq!(paused.status, WorkflowStatus::Paused);
    assert_eq!(paused.step("a").unwrap().status, StepStatus::Completed);
    assert_eq!(paused.step("b").unwrap().status, StepStatus::Pending);
    assert_eq!(b_calls.load(Ordering::SeqCst), 0);

    orch.resume(id).unwrap();
    let done = orch.wait(id).await.unwrap();
    assert_eq!(done.status, WorkflowStatus::Completed);
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);

    let names: Vec<&str> = orch.events_for(id).iter().map(|e| e.kind.name()).collect();
    assert!(names.contains(&"workflow.paused"));
    assert!(names.contains(&"workflow.resumed"));
    assert!(names.contains(&"checkpoint.created"));
}

#[tokio::test]
async fn job_resumes_from_latest_checkpoint() {
    let orch = Orchestrator::default();
    let a_calls = Arc::new(AtomicUsize::new(0));
    let b_calls = Arc::new(AtomicUsize::new(0));
    orch.register_step_handler("count", counting_ok(Arc::clone(&a_calls)));
    let b = Arc::clone(&b_calls);
    orch.register_step_handler("second_time_lucky",
                               handler_fn(move |_s, ctx| {
                                   let first = b.fetch_add(1, Ordering::SeqCst) == 0;
                                   async move {
                                       if first {
                                           return Err(StepError::validation("schema drift"));
                                       }
                                       let upstream = ctx.output("a").cloned().unwrap_or_default();
                                       Ok(StepOutput::new(json!({ "upstream": upstream })))
                                   }
                               }));
    orch.register(WorkflowDefinition::new("job",
                                          "job",
                                          vec![WorkflowStep::new("a", "count"),
                                               WorkflowStep::new("b", "second_time_lucky").depends_on(["a"])]))
        .unwrap();

    let first = orch.execute_job("job", "nightly", json!({})).unwrap();
    let first = orch.wait(first).await.unwrap();
    assert_eq!(first.status, WorkflowStatus::Failed);
    let cp = orch.recovery()
                 .find_latest_checkpoint("nightly", None, Some(CheckpointKind::Job))
                 .unwrap()
                 .expect("job checkpoint");
    assert!(cp.position["completed"].get("a").is_some());

    let second = orch.execute_job("job", "nightly", json!({})).unwrap();
    let result = orch.wait(second).await.unwrap();
    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(a_calls.load(Ordering::SeqCst), 1, "restored step is not re-run");
    assert_eq!(result.step("a").unwrap().records_processed, 2);
    assert_eq!(result.step("b").unwrap().output,
               Some(json!({ "upstream": { "from": "a" } })));
}

#[tokio::test]
async fn periodic_checkpoints_and_eviction() {
    let config = OrchestratorConfig { checkpoint_every: 1,
                                      execution_retention: Duration::from_millis(20),
                                      ..OrchestratorConfig::default() };
    let orch = Orchestrator::builder().config(config).build();
    orch.register_step_handler("count", counting_ok(Arc::new(AtomicUsize::new(0))));
    orch.register(WorkflowDefinition::new("ev",
                                          "ev",
                                          vec![WorkflowStep::new("a", "count"),
                                               WorkflowStep::new("b", "count").depends_on(["a"])]))
        .unwrap();
    let id = orch.execute_job("ev", "job-ev", json!({})).unwrap();
    orch.wait(id).await.unwrap();
    let summary = orch.recovery().checkpoint_summary().unwrap();
    // uno por step completado más el final
    assert_eq!(summary.by_job.get("job-ev"), Some(&3));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(orch.status(id).is_err());
    assert!(orch.events_for(id).is_empty());
}

#[tokio::test]
async fn finished_job_starts_a_fresh_pass() {
    let orch = Orchestrator::default();
    let calls = Arc::new(AtomicUsize::new(0));
    orch.register_step_handler("count", counting_ok(Arc::clone(&calls)));
    orch.register(WorkflowDefinition::new("again", "again", vec![WorkflowStep::new("a", "count")]))
        .unwrap();

    for _ in 0..2 {
        let id = orch.execute_job("again", "hourly", json!({})).unwrap();
        assert_eq!(orch.wait(id).await.unwrap().status, WorkflowStatus::Completed);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let cp = orch.recovery()
                 .find_latest_checkpoint("hourly", None, Some(CheckpointKind::Job))
                 .unwrap()
                 .unwrap();
    assert_eq!(cp.position["finished"], json!(true));
}
