use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::health::HealthState;
use crate::catalog::CatalogRegistrar;
use crate::codec::{encode, CSV_CONTENT_TYPE};
use crate::config::{keys, Config, SummaryStrategy, INGEST_WINDOW_DAYS};
use crate::error::{AppError, Result};
use crate::extract::extract_summary;
use crate::fetcher::FeedSource;
use crate::flatten::flatten;
use crate::query::sql::summary_sql;
use crate::query::QueryRunner;
use crate::storage::ObjectStore;
use crate::types::{DateRange, RunRecord, Sequence, Trigger};

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub message: String,
    pub bucket: String,
    pub key: String,
    pub rows: usize,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub message: String,
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub message: String,
    pub error: String,
}

/// Request/response result of one invocation.
#[derive(Debug, Clone)]
pub struct RunResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
}

impl RunResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Ledger error for a run whose caller went away before it finished.
pub const RUN_ABANDONED: &str = "Run abandoned before completion";

pub fn raw_object_key(range: &DateRange) -> String {
    format!("{}/neo_{}_to_{}.csv", keys::RAW_PREFIX, range.start_str(), range.end_str())
}

pub fn summary_object_key(reference_date: NaiveDate) -> String {
    format!("{}/{}.csv", keys::SUMMARY_PREFIX, reference_date.format("%Y-%m-%d"))
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Sequences fetch → flatten → encode → store, and
/// register → aggregate → extract → encode → store.
pub struct Pipeline {
    cfg: Config,
    feed: Arc<dyn FeedSource>,
    store: Arc<dyn ObjectStore>,
    runner: QueryRunner,
    health: Arc<HealthState>,
    ledger_tx: Option<mpsc::Sender<RunRecord>>,
}

impl Pipeline {
    pub fn new(
        cfg: Config,
        feed: Arc<dyn FeedSource>,
        store: Arc<dyn ObjectStore>,
        runner: QueryRunner,
        health: Arc<HealthState>,
    ) -> Self {
        Self { cfg, feed, store, runner, health, ledger_tx: None }
    }

    pub fn with_ledger(mut self, ledger_tx: mpsc::Sender<RunRecord>) -> Self {
        self.ledger_tx = Some(ledger_tx);
        self
    }

    /// Raw-ingest sequence: the 7-day window ending at `now`'s UTC date is
    /// fetched, flattened and written as one CSV object.
    pub async fn run_ingest(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> Result<IngestReport> {
        let settings = self.cfg.ingest_settings()?;
        let range = DateRange::trailing(now.date_naive(), INGEST_WINDOW_DAYS);
        info!(start_date = %range.start_str(), end_date = %range.end_str(), "Starting NEO ingest");

        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            payload = self.feed.fetch(&range, &settings.api_key) => payload?,
        };

        let rows = flatten(&payload, &range)?;
        let csv = encode(&rows, self.cfg.csv_mode)?;

        let key = raw_object_key(&range);
        self.store
            .put(&settings.bucket, &key, csv.into_bytes(), CSV_CONTENT_TYPE)
            .await?;
        info!(bucket = %settings.bucket, key = %key, rows = rows.len(), "Uploaded to s3://{}/{}", settings.bucket, key);

        Ok(IngestReport {
            message: "NEO CSV generated and uploaded to S3".to_string(),
            bucket: settings.bucket,
            key,
            rows: rows.len(),
            start_date: range.start_str(),
            end_date: range.end_str(),
        })
    }

    /// Summarize sequence for `reference_date`. With the partition strategy the
    /// table is registered first, and the aggregate is only submitted once the
    /// registration has succeeded.
    pub async fn run_summarize(
        &self,
        reference_date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<SummaryReport> {
        let settings = self.cfg.summarize_settings()?;
        info!(
            reference_date = %reference_date,
            strategy = %settings.strategy,
            "Starting NEO summary"
        );

        if settings.strategy == SummaryStrategy::RegisterPartition {
            CatalogRegistrar::new(self.runner.clone(), &settings.database, &settings.bucket)
                .register(reference_date, cancel)
                .await?;
        }

        let sql = summary_sql(settings.strategy, reference_date);
        debug!(sql = %sql, "Running metrics query");
        let grid = self.runner.run(&sql, &settings.database, cancel).await?;

        let summary = extract_summary(&grid)?;
        let csv = encode(std::slice::from_ref(&summary), self.cfg.csv_mode)?;
        debug!(csv = %csv, "Metrics CSV");

        let key = summary_object_key(reference_date);
        self.store
            .put(&settings.bucket, &key, csv.into_bytes(), CSV_CONTENT_TYPE)
            .await?;
        info!(bucket = %settings.bucket, key = %key, "Summary uploaded to s3://{}/{}", settings.bucket, key);

        Ok(SummaryReport {
            message: "NEO summary generated and uploaded to S3".to_string(),
            bucket: settings.bucket,
            key,
        })
    }

    /// Entry point shared by the scheduler and the HTTP API: runs one sequence
    /// under the configured deadline and turns the outcome into a response.
    /// Failures are logged here and never escape as errors.
    pub async fn invoke(
        &self,
        sequence: Sequence,
        trigger: Trigger,
        now: DateTime<Utc>,
        reference_date: Option<NaiveDate>,
        cancel: &CancellationToken,
    ) -> RunResponse {
        let guard = RunGuard::start(self, sequence, trigger);

        let (response, object_key, row_count) = match sequence {
            Sequence::Ingest => match self.with_deadline(self.run_ingest(now, cancel)).await {
                Ok(report) => {
                    let key = report.key.clone();
                    let rows = report.rows as i64;
                    (success(&report), Some(key), Some(rows))
                }
                Err(e) => (self.failure(sequence, trigger, "Error generating or uploading CSV", &e), None, None),
            },
            Sequence::Summarize => {
                let date = reference_date.unwrap_or_else(|| now.date_naive());
                match self.with_deadline(self.run_summarize(date, cancel)).await {
                    Ok(report) => {
                        let key = report.key.clone();
                        (success(&report), Some(key), None)
                    }
                    Err(e) => (self.failure(sequence, trigger, "Error generating NEO summary", &e), None, None),
                }
            }
        };

        guard.finish(&response, object_key, row_count);
        response
    }

    async fn with_deadline<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.cfg.run_timeout_secs {
            0 => fut.await,
            secs => tokio::time::timeout(Duration::from_secs(secs), fut)
                .await
                .unwrap_or(Err(AppError::Timeout(secs))),
        }
    }

    fn failure(&self, sequence: Sequence, trigger: Trigger, message: &str, e: &AppError) -> RunResponse {
        error!(sequence = %sequence, trigger = %trigger, "Error in {sequence} run: {e}");
        let body = FailureReport {
            message: message.to_string(),
            error: e.to_string(),
        };
        RunResponse {
            status_code: 500,
            body: serde_json::to_value(body).unwrap_or_default(),
        }
    }
}

/// Pairs `run_started` with exactly one `run_finished` and one ledger record,
/// including when the invoking future is dropped mid-run.
struct RunGuard<'a> {
    health: &'a HealthState,
    ledger_tx: Option<&'a mpsc::Sender<RunRecord>>,
    sequence: Sequence,
    trigger: Trigger,
    started_at_ms: i64,
    finished: bool,
}

impl<'a> RunGuard<'a> {
    fn start(pipeline: &'a Pipeline, sequence: Sequence, trigger: Trigger) -> Self {
        pipeline.health.run_started();
        Self {
            health: &pipeline.health,
            ledger_tx: pipeline.ledger_tx.as_ref(),
            sequence,
            trigger,
            started_at_ms: now_ms(),
            finished: false,
        }
    }

    fn finish(mut self, response: &RunResponse, object_key: Option<String>, row_count: Option<i64>) {
        self.finished = true;
        let error = response.body.get("error").and_then(|e| e.as_str()).map(str::to_string);
        self.record(response.is_success(), object_key, row_count, error);
    }

    fn record(&self, succeeded: bool, object_key: Option<String>, row_count: Option<i64>, error: Option<String>) {
        let finished_at_ms = now_ms();
        self.health.run_finished(self.sequence, succeeded, finished_at_ms);

        if let Some(tx) = self.ledger_tx {
            let record = RunRecord {
                sequence: self.sequence,
                trigger: self.trigger,
                started_at_ms: self.started_at_ms,
                finished_at_ms,
                succeeded,
                object_key,
                row_count,
                error,
            };
            if let Err(e) = tx.try_send(record) {
                warn!("run ledger channel full, dropping record: {e}");
            }
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(sequence = %self.sequence, trigger = %self.trigger, "{} run abandoned before completion", self.sequence);
        self.record(false, None, None, Some(RUN_ABANDONED.to_string()));
    }
}

fn success<T: Serialize>(report: &T) -> RunResponse {
    RunResponse {
        status_code: 200,
        body: serde_json::to_value(report).unwrap_or_default(),
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
