use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::db::models::RunRow;
use crate::error::Result;
use crate::types::{RunRecord, Sequence};

/// Receives finished run records and persists them to SQLite.
/// Runs as a dedicated background task so ledger writes never delay a run.
pub struct RunLedgerWriter {
    pool: sqlx::SqlitePool,
    run_rx: mpsc::Receiver<RunRecord>,
}

impl RunLedgerWriter {
    pub fn new(pool: sqlx::SqlitePool, run_rx: mpsc::Receiver<RunRecord>) -> Self {
        Self { pool, run_rx }
    }

    pub async fn run(mut self) {
        while let Some(record) = self.run_rx.recv().await {
            if let Err(e) = write_run(&self.pool, &record).await {
                error!("DB write error: {e}");
            }
        }
    }
}

pub async fn write_run(pool: &sqlx::SqlitePool, r: &RunRecord) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO pipeline_runs (
            sequence, triggered_by, started_at, finished_at,
            succeeded, object_key, row_count, error
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(r.sequence.to_string())
    .bind(r.trigger.to_string())
    .bind(r.started_at_ms)
    .bind(r.finished_at_ms)
    .bind(r.succeeded)
    .bind(r.object_key.as_deref())
    .bind(r.row_count)
    .bind(r.error.as_deref())
    .execute(pool)
    .await?;

    debug!(id = result.last_insert_rowid(), sequence = %r.sequence, "run recorded");
    Ok(())
}

/// Most recent runs first, optionally for one sequence.
pub async fn recent_runs(
    pool: &sqlx::SqlitePool,
    sequence: Option<Sequence>,
    limit: i64,
) -> Result<Vec<RunRow>> {
    let rows = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT id, sequence, triggered_by, started_at, finished_at,
               succeeded, object_key, row_count, error
        FROM pipeline_runs
        WHERE ?1 IS NULL OR sequence = ?1
        ORDER BY started_at DESC, id DESC
        LIMIT ?2
        "#,
    )
    .bind(sequence.map(|s| s.to_string()))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
