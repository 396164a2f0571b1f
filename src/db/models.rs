use serde::Serialize;

/// Row of the `pipeline_runs` ledger table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RunRow {
    pub id: i64,
    pub sequence: String,
    pub triggered_by: String,
    pub started_at: i64,
    pub finished_at: i64,
    pub succeeded: bool,
    pub object_key: Option<String>,
    pub row_count: Option<i64>,
    pub error: Option<String>,
}
