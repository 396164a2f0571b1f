use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::db::models::RunRow;
use crate::db::writer::recent_runs;
use crate::error::AppError;
use crate::pipeline::Pipeline;
use crate::types::{Sequence, Trigger};

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub pipeline: Arc<Pipeline>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
    pub shutdown: CancellationToken,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/runs/ingest", post(post_ingest))
        .route("/runs/summarize", post(post_summarize))
        .route("/runs", get(get_runs))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct SummarizeQuery {
    /// Reference date override, `YYYY-MM-DD`. Defaults to today (UTC).
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct RunsQuery {
    pub sequence: Option<String>,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub runs_in_flight: u64,
    pub failed_runs: u64,
    pub last_ingest_ok_ms: Option<i64>,
    pub last_summary_ok_ms: Option<i64>,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
    pub max_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn post_ingest(State(state): State<ApiState>) -> (StatusCode, Json<serde_json::Value>) {
    let cancel = state.shutdown.child_token();
    let resp = state
        .pipeline
        .invoke(Sequence::Ingest, Trigger::Api, Utc::now(), None, &cancel)
        .await;
    into_reply(resp.status_code, resp.body)
}

async fn post_summarize(
    State(state): State<ApiState>,
    Query(params): Query<SummarizeQuery>,
) -> (StatusCode, Json<serde_json::Value>) {
    let cancel = state.shutdown.child_token();
    let resp = state
        .pipeline
        .invoke(Sequence::Summarize, Trigger::Api, Utc::now(), params.date, &cancel)
        .await;
    into_reply(resp.status_code, resp.body)
}

fn into_reply(status_code: u16, body: serde_json::Value) -> (StatusCode, Json<serde_json::Value>) {
    let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body))
}

async fn get_runs(
    State(state): State<ApiState>,
    Query(params): Query<RunsQuery>,
) -> Result<Json<Vec<RunRow>>, AppError> {
    let sequence = match params.sequence.as_deref() {
        None => None,
        Some("ingest") => Some(Sequence::Ingest),
        Some("summarize") => Some(Sequence::Summarize),
        Some(other) => {
            return Err(AppError::BadRequest(format!("unknown sequence {other:?}")));
        }
    };
    let limit = params.limit.unwrap_or(50).clamp(1, 500);

    let rows = recent_runs(&state.pool, sequence, limit).await?;
    Ok(Json(rows))
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let h = &state.health;
    Json(HealthResponse {
        status: "ok",
        runs_in_flight: h.runs_in_flight(),
        failed_runs: h.failed_runs(),
        last_ingest_ok_ms: h.last_ok_ms(Sequence::Ingest),
        last_summary_ok_ms: h.last_ok_ms(Sequence::Summarize),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let (p50_ms, p95_ms, p99_ms) = state.latency.percentiles();
    Json(LatencyResponse {
        samples: state.latency.len(),
        p50_ms,
        p95_ms,
        p99_ms,
        max_ms: state.latency.max_ms(),
    })
}
