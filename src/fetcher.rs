use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::config::HTTP_TIMEOUT_SECS;
use crate::error::{AppError, Result};
use crate::types::{DateRange, FeedResponse, RawFeedPayload};

/// Source of close-approach records for a date window.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, range: &DateRange, api_key: &str) -> Result<RawFeedPayload>;
}

/// NeoWs `feed` endpoint client.
pub struct NeoFeedClient {
    client: reqwest::Client,
    feed_url: String,
}

impl NeoFeedClient {
    pub fn new(feed_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            feed_url: feed_url.to_string(),
        })
    }
}

#[async_trait]
impl FeedSource for NeoFeedClient {
    /// Fetch the feed for `range`. A non-2xx response is a hard failure; its
    /// body is logged and carried in the error.
    async fn fetch(&self, range: &DateRange, api_key: &str) -> Result<RawFeedPayload> {
        let start_date = range.start_str();
        let end_date = range.end_str();
        debug!(start_date = %start_date, end_date = %end_date, "requesting NEO feed");

        let resp = self
            .client
            .get(&self.feed_url)
            .query(&[
                ("start_date", start_date.as_str()),
                ("end_date", end_date.as_str()),
                ("api_key", api_key),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            error!(status = status.as_u16(), body = %body, "NASA error body");
            return Err(AppError::Fetch { status: status.as_u16(), body });
        }

        let feed = parse_feed(&body)?;
        info!(
            start_date = %start_date,
            end_date = %end_date,
            days = feed.days.len(),
            objects = feed.object_count(),
            "Fetched NEO feed"
        );
        Ok(feed)
    }
}

/// Parse a feed response body down to its day-keyed payload.
pub fn parse_feed(body: &str) -> Result<RawFeedPayload> {
    let resp: FeedResponse = serde_json::from_str(body)?;
    if let Some(expected) = resp.element_count {
        let actual = resp.near_earth_objects.object_count() as u64;
        if expected != actual {
            debug!(expected, actual, "feed element_count differs from object count");
        }
    }
    Ok(resp.near_earth_objects)
}

#[cfg(test)]
pub mod mock {
    use std::sync::Mutex;

    use super::*;

    /// Returns a canned payload (or error) and remembers the requested ranges.
    pub struct StaticFeed {
        response: Mutex<Option<Result<RawFeedPayload>>>,
        pub requested: Mutex<Vec<DateRange>>,
    }

    impl StaticFeed {
        pub fn new(response: Result<RawFeedPayload>) -> Self {
            Self {
                response: Mutex::new(Some(response)),
                requested: Mutex::new(Vec::new()),
            }
        }

        pub fn requested(&self) -> Vec<DateRange> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FeedSource for StaticFeed {
        async fn fetch(&self, range: &DateRange, _api_key: &str) -> Result<RawFeedPayload> {
            self.requested.lock().unwrap().push(*range);
            self.response
                .lock()
                .unwrap()
                .take()
                .expect("StaticFeed fetched more than once")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::fixtures::neo;

    #[test]
    fn parses_nested_feed_body() {
        // Built as text: the day keys are deliberately out of calendar order.
        let body = format!(
            r#"{{"links": {{"self": "http://api.nasa.gov/neo/rest/v1/feed"}}, "element_count": 2,
                "near_earth_objects": {{"2024-01-07": [{}], "2024-01-01": [{}]}}}}"#,
            neo("2", "B", &[("2024-01-07", "Earth", "12.5")]),
            neo("1", "A", &[("2024-01-01", "Earth", "3.2")]),
        );

        let payload = parse_feed(&body).unwrap();
        assert_eq!(payload.object_count(), 2);
        assert_eq!(payload.days[0].0, "2024-01-07");
        assert_eq!(payload.days[1].1[0].name, "A");
    }

    #[test]
    fn missing_top_level_key_is_a_json_error() {
        let err = parse_feed(r#"{"element_count": 0}"#).unwrap_err();
        assert!(matches!(err, AppError::Json(_)));
    }
}
