use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed request failed with status {status}")]
    Fetch { status: u16, body: String },

    #[error("No NEO rows for {start_date} to {end_date}")]
    EmptyResult { start_date: String, end_date: String },

    #[error("Malformed feed payload: {0}")]
    MalformedPayload(String),

    #[error("Query submission rejected: {0}")]
    Submission(String),

    #[error("Query {execution_id} FAILED: {reason}")]
    QueryFailed { execution_id: String, reason: String },

    #[error("Query {execution_id} CANCELLED: {reason}")]
    QueryCancelled { execution_id: String, reason: String },

    #[error("Query returned {rows} row(s), expected a header and at least one data row")]
    InsufficientRows { rows: usize },

    #[error("Catalog registration failed: {0}")]
    Catalog(#[source] Box<AppError>),

    #[error("Query engine error: {0}")]
    Engine(String),

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Run exceeded its {0}s deadline")]
    Timeout(u64),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV encode error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
