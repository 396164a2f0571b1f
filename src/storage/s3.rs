use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::config::HTTP_TIMEOUT_SECS;
use crate::error::{AppError, Result};
use crate::storage::ObjectStore;

/// S3-compatible store using path-style `PUT <endpoint>/<bucket>/<key>`. Requests are unsigned.
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, bucket, key.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let url = self.object_url(bucket, key);
        let size = body.len();
        let resp = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!(bucket, key, status = status.as_u16(), body = %text, "PutObject failed");
            return Err(AppError::Storage(format!(
                "PutObject s3://{bucket}/{key} returned {status}"
            )));
        }

        debug!(bucket, key, bytes = size, "PutObject ok");
        Ok(())
    }
}
