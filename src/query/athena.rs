use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::config::{Config, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::query::{ExecutionStatus, QueryEngine, QueryState, ResultGrid};

const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const TARGET_PREFIX: &str = "AmazonAthena";

/// Athena client speaking the JSON 1.1 protocol. Requests are unsigned.
pub struct AthenaClient {
    client: reqwest::Client,
    endpoint: String,
    workgroup: Option<String>,
    output_location: Option<String>,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StartQueryExecutionRequest<'a> {
    query_string: &'a str,
    query_execution_context: QueryExecutionContext<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    work_group: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_configuration: Option<ResultConfiguration<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecutionContext<'a> {
    database: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ResultConfiguration<'a> {
    output_location: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StartQueryExecutionResponse {
    query_execution_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ExecutionRequest<'a> {
    query_execution_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueryExecutionResponse {
    query_execution: QueryExecutionBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecutionBody {
    status: QueryExecutionStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecutionStatus {
    state: String,
    state_change_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueryResultsResponse {
    result_set: ResultSet,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultSet {
    #[serde(default)]
    rows: Vec<Row>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Row {
    #[serde(default)]
    data: Vec<Datum>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Datum {
    var_char_value: Option<String>,
}

impl From<ResultSet> for ResultGrid {
    fn from(set: ResultSet) -> Self {
        ResultGrid {
            rows: set
                .rows
                .into_iter()
                .map(|row| row.data.into_iter().map(|d| d.var_char_value).collect())
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type")]
    kind: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

/// Readable message from an error response body, falling back to the raw body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { kind, message: Some(message) }) => match kind {
            Some(kind) => format!("{}: {message}", kind.rsplit('#').next().unwrap_or(&kind)),
            None => message,
        },
        _ => body.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

impl AthenaClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            endpoint: cfg.athena_endpoint.trim_end_matches('/').to_string(),
            workgroup: cfg.athena_workgroup.clone(),
            output_location: cfg.athena_output_location.clone(),
        })
    }

    /// POST one operation. Non-2xx responses come back as `Err((status, message))`.
    async fn call<B: Serialize, R: DeserializeOwned>(
        &self,
        operation: &str,
        body: &B,
    ) -> Result<std::result::Result<R, (u16, String)>> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header("X-Amz-Target", format!("{TARGET_PREFIX}.{operation}"))
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!(operation, status = status.as_u16(), body = %text, "Athena error response");
            return Ok(Err((status.as_u16(), error_message(&text))));
        }

        Ok(Ok(resp.json::<R>().await?))
    }
}

#[async_trait]
impl QueryEngine for AthenaClient {
    async fn start_execution(&self, sql: &str, database: &str) -> Result<String> {
        let request = StartQueryExecutionRequest {
            query_string: sql,
            query_execution_context: QueryExecutionContext { database },
            work_group: self.workgroup.as_deref(),
            result_configuration: self
                .output_location
                .as_deref()
                .map(|output_location| ResultConfiguration { output_location }),
        };

        match self
            .call::<_, StartQueryExecutionResponse>("StartQueryExecution", &request)
            .await?
        {
            Ok(resp) => Ok(resp.query_execution_id),
            Err((status, message)) if (400..500).contains(&status) => Err(AppError::Submission(message)),
            Err((status, message)) => Err(AppError::Engine(format!(
                "StartQueryExecution returned {status}: {message}"
            ))),
        }
    }

    async fn get_execution(&self, execution_id: &str) -> Result<ExecutionStatus> {
        let request = ExecutionRequest { query_execution_id: execution_id, next_token: None };
        let resp = self
            .call::<_, GetQueryExecutionResponse>("GetQueryExecution", &request)
            .await?
            .map_err(|(status, message)| {
                AppError::Engine(format!("GetQueryExecution returned {status}: {message}"))
            })?;

        let status = resp.query_execution.status;
        let state = QueryState::from_engine(&status.state).ok_or_else(|| {
            AppError::Engine(format!("unknown query state {:?} for {execution_id}", status.state))
        })?;
        Ok(ExecutionStatus {
            state,
            reason: status.state_change_reason.filter(|r| !r.is_empty()),
        })
    }

    async fn get_results(&self, execution_id: &str) -> Result<ResultGrid> {
        let mut grid = ResultGrid::default();
        let mut next_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let request = ExecutionRequest {
                query_execution_id: execution_id,
                next_token: next_token.as_deref(),
            };
            let resp = self
                .call::<_, GetQueryResultsResponse>("GetQueryResults", &request)
                .await?
                .map_err(|(status, message)| {
                    AppError::Engine(format!("GetQueryResults returned {status}: {message}"))
                })?;

            pages += 1;
            grid.rows.extend(ResultGrid::from(resp.result_set).rows);

            match resp.next_token {
                Some(token) if !token.is_empty() => {
                    if next_token.as_deref() == Some(token.as_str()) {
                        warn!(execution_id, "result pagination returned the same token twice, stopping");
                        break;
                    }
                    next_token = Some(token);
                }
                _ => break,
            }
        }

        debug!(execution_id, pages, rows = grid.rows.len(), "collected result pages");
        Ok(grid)
    }
}
