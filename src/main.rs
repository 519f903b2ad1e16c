//! Demo: pipeline extract→transform→load entre dos conectores en memoria,
//! con un conflicto de edición concurrente resuelto por last-write-wins.
use chrono::{Duration, Utc};
use log::{error, info};
use serde_json::json;
use std::sync::Arc;

use sync_adapters::InMemoryConnector;
use sync_domain::ChangeRecord;
use syncflow::{EtlSpec, SyncError, SyncRuntime, CONFIG};

fn customer(id: &str, origin: &str, seq: i64, email: &str) -> Result<ChangeRecord, SyncError> {
    Ok(ChangeRecord::from_json(id, origin, json!({ "seq": seq, "email": email }))?)
}

async fn run_demo() -> Result<(), SyncError> {
    let runtime = SyncRuntime::with_postgres(CONFIG.clone())?;

    let now = Utc::now();
    let crm = Arc::new(InMemoryConnector::new("crm"));
    crm.seed([customer("c1", "crm", 1, "ana@new.io")?.with_timestamp(now),
              customer("c2", "crm", 2, "luis@x.io")?,
              customer("c3", "crm", 3, "eva@x.io")?]);
    let warehouse = Arc::new(InMemoryConnector::new("warehouse"));
    warehouse.seed([customer("c1", "warehouse", 1, "ana@old.io")?.with_timestamp(now - Duration::seconds(2))]);
    runtime.register_connector(crm.clone());
    runtime.register_connector(warehouse.clone());

    let etl = EtlSpec::new("customers-etl", "customers", "crm", "warehouse").incremental("seq")
                                                                             .batch_size(2);
    runtime.register_etl(&etl)?;

    let orch = runtime.orchestrator();
    let id = orch.execute_job("customers-etl", "demo", json!({}))?;
    let result = orch.wait(id).await?;
    println!("workflow {} -> {}", result.execution_id, result.status.as_str());
    for step in &result.steps {
        println!("  {:<10} {:<10} records={} retries={}",
                 step.step_id,
                 step.status.as_str(),
                 step.records_processed,
                 step.retry_count);
    }

    for conflict in runtime.conflicts_by_table("customers") {
        let strategy = conflict.resolution
                               .as_ref()
                               .map(|r| r.strategy.as_str())
                               .unwrap_or("-");
        println!("conflict {} {} -> {} ({strategy})",
                 conflict.record_id,
                 conflict.kind.as_str(),
                 conflict.status.as_str());
    }
    println!("warehouse now holds {} record(s)", warehouse.len());

    let stats = serde_json::to_string_pretty(&runtime.stats()).unwrap_or_default();
    println!("{stats}");
    let checkpoints = runtime.checkpoint_summary()?;
    info!("checkpoints: {} total", checkpoints.total);
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run_demo().await {
        error!("demo failed: {e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
