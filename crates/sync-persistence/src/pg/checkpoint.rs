//! `CheckpointStore` sobre la tabla `sync_checkpoints`.
//!
//! La monotonía de `created_at` por serie (job, tabla, tipo) se garantiza
//! dentro de la transacción de inserción: un advisory lock por serie
//! serializa los escritores y el nuevo valor se ajusta a `max + 1µs` si el
//! reloj no avanzó. Postgres guarda microsegundos, así que el valor se trunca
//! antes de comparar.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use diesel::dsl::max;
use diesel::prelude::*;
use diesel::sql_types::Text;
use log::{debug, info};
use serde_json::Value;
use sync_core::{Checkpoint, CheckpointError, CheckpointKind, CheckpointStore};
use uuid::Uuid;

use super::{with_retry, ConnectionProvider};
use crate::error::PersistenceError;
use crate::schema::sync_checkpoints;

#[derive(Queryable, Debug)]
struct CheckpointRow {
    id: Uuid,
    kind: String,
    job_id: String,
    table_name: Option<String>,
    position: Value,
    snapshot: Option<Value>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CheckpointRow> for Checkpoint {
    type Error = CheckpointError;

    fn try_from(row: CheckpointRow) -> Result<Self, Self::Error> {
        Ok(Checkpoint { id: row.id,
                        kind: row.kind.parse()?,
                        job_id: row.job_id,
                        table: row.table_name,
                        position: row.position,
                        snapshot: row.snapshot,
                        created_at: row.created_at })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = sync_checkpoints)]
struct NewCheckpointRow<'a> {
    id: Uuid,
    kind: &'a str,
    job_id: &'a str,
    table_name: Option<&'a str>,
    position: &'a Value,
    snapshot: Option<&'a Value>,
    created_at: DateTime<Utc>,
}

fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

pub struct PgCheckpointStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgCheckpointStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    fn insert(&self, checkpoint: &Checkpoint) -> Result<DateTime<Utc>, PersistenceError> {
        let series = format!("{}|{}|{}",
                             checkpoint.job_id,
                             checkpoint.table.as_deref().unwrap_or(""),
                             checkpoint.kind.as_str());
        let wanted = truncate_micros(checkpoint.created_at);
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx| {
                    diesel::sql_query("SELECT pg_advisory_xact_lock(hashtext($1))").bind::<Text, _>(series.clone())
                                                                                   .execute(tx)?;
                    let last: Option<DateTime<Utc>> =
                        sync_checkpoints::table.filter(sync_checkpoints::job_id.eq(&checkpoint.job_id))
                                               .filter(sync_checkpoints::table_name.is_not_distinct_from(checkpoint.table.as_deref()))
                                               .filter(sync_checkpoints::kind.eq(checkpoint.kind.as_str()))
                                               .select(max(sync_checkpoints::created_at))
                                               .first(tx)?;
                    let created_at = match last {
                        Some(last) if wanted <= last => last + ChronoDuration::microseconds(1),
                        _ => wanted,
                    };
                    diesel::insert_into(sync_checkpoints::table).values(NewCheckpointRow { id: checkpoint.id,
                                                                                            kind: checkpoint.kind.as_str(),
                                                                                            job_id: &checkpoint.job_id,
                                                                                            table_name: checkpoint.table.as_deref(),
                                                                                            position: &checkpoint.position,
                                                                                            snapshot: checkpoint.snapshot.as_ref(),
                                                                                            created_at })
                                                                .execute(tx)?;
                    Ok::<DateTime<Utc>, diesel::result::Error>(created_at)
                })
                .map_err(PersistenceError::from)
        })
    }
}

impl<P: ConnectionProvider> CheckpointStore for PgCheckpointStore<P> {
    fn append(&self, mut checkpoint: Checkpoint) -> Result<Checkpoint, CheckpointError> {
        checkpoint.created_at = self.insert(&checkpoint)?;
        debug!("checkpoint {} ({}) stored for job {}", checkpoint.id, checkpoint.kind, checkpoint.job_id);
        Ok(checkpoint)
    }

    fn latest(&self, job_id: &str, table: Option<&str>, kind: Option<CheckpointKind>) -> Result<Option<Checkpoint>, CheckpointError> {
        let row: Option<CheckpointRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            let mut query = sync_checkpoints::table.filter(sync_checkpoints::job_id.eq(job_id)).into_boxed();
            if let Some(t) = table {
                query = query.filter(sync_checkpoints::table_name.eq(t));
            }
            if let Some(k) = kind {
                query = query.filter(sync_checkpoints::kind.eq(k.as_str()));
            }
            query.order(sync_checkpoints::created_at.desc())
                 .first::<CheckpointRow>(&mut conn)
                 .optional()
                 .map_err(PersistenceError::from)
        })?;
        row.map(Checkpoint::try_from).transpose()
    }

    fn list(&self, job_id: Option<&str>) -> Result<Vec<Checkpoint>, CheckpointError> {
        let rows: Vec<CheckpointRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            let mut query = sync_checkpoints::table.into_boxed();
            if let Some(j) = job_id {
                query = query.filter(sync_checkpoints::job_id.eq(j));
            }
            query.order(sync_checkpoints::created_at.asc())
                 .load::<CheckpointRow>(&mut conn)
                 .map_err(PersistenceError::from)
        })?;
        rows.into_iter().map(Checkpoint::try_from).collect()
    }

    fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, CheckpointError> {
        let removed = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::delete(sync_checkpoints::table.filter(sync_checkpoints::created_at.lt(cutoff))).execute(&mut conn)
                                                                                                 .map_err(PersistenceError::from)
        })?;
        if removed > 0 {
            info!("pruned {removed} checkpoint(s) older than {cutoff}");
        }
        Ok(removed)
    }
}
