//! Asynchronous query execution against an external SQL engine.

pub mod athena;
pub mod runner;
pub mod sql;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde::Serialize;

pub use athena::AthenaClient;
pub use runner::QueryRunner;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Submitted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    /// Parse an engine state name. `QUEUED` is the engine's name for a submitted query.
    pub fn from_engine(s: &str) -> Option<Self> {
        match s {
            "QUEUED" | "SUBMITTED" => Some(QueryState::Submitted),
            "RUNNING" => Some(QueryState::Running),
            "SUCCEEDED" => Some(QueryState::Succeeded),
            "FAILED" => Some(QueryState::Failed),
            "CANCELLED" => Some(QueryState::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueryState::Submitted => "SUBMITTED",
            QueryState::Running => "RUNNING",
            QueryState::Succeeded => "SUCCEEDED",
            QueryState::Failed => "FAILED",
            QueryState::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

/// State of an execution as last reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStatus {
    pub state: QueryState,
    /// Engine-provided explanation, normally present only for FAILED/CANCELLED.
    pub reason: Option<String>,
}

/// A submitted statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryExecution {
    pub id: String,
    pub state: QueryState,
    pub reason: Option<String>,
}

/// Query output: rows of nullable cells. Row 0 is the header for SELECTs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultGrid {
    pub rows: Vec<Vec<Option<String>>>,
}

/// The three operations the runner needs from a query engine.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Submit a statement; returns the engine-assigned execution id.
    async fn start_execution(&self, sql: &str, database: &str) -> Result<String>;

    async fn get_execution(&self, execution_id: &str) -> Result<ExecutionStatus>;

    /// Full result set of a SUCCEEDED execution.
    async fn get_results(&self, execution_id: &str) -> Result<ResultGrid>;
}
