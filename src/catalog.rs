use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::RAW_TABLE;
use crate::error::{AppError, Result};
use crate::query::sql::{create_table_sql, partition_location};
use crate::query::QueryRunner;

/// Declares the raw external table over a date partition.
pub struct CatalogRegistrar {
    runner: QueryRunner,
    database: String,
    bucket: String,
}

impl CatalogRegistrar {
    pub fn new(runner: QueryRunner, database: &str, bucket: &str) -> Self {
        Self {
            runner,
            database: database.to_string(),
            bucket: bucket.to_string(),
        }
    }

    /// Register the table over `partition_date`'s location. The statement is
    /// `CREATE ... IF NOT EXISTS`, so repeating it is a no-op. Returns only
    /// after the DDL reached a terminal state.
    pub async fn register(&self, partition_date: NaiveDate, cancel: &CancellationToken) -> Result<()> {
        let sql = create_table_sql(&self.database, &self.bucket, partition_date);
        match self.runner.run(&sql, &self.database, cancel).await {
            Ok(_) => {
                info!(
                    table = RAW_TABLE,
                    location = %partition_location(&self.bucket, partition_date),
                    "Table {RAW_TABLE} created/updated"
                );
                Ok(())
            }
            Err(AppError::Cancelled) => Err(AppError::Cancelled),
            Err(e) => Err(AppError::Catalog(Box::new(e))),
        }
    }
}
