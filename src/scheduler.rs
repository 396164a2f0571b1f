use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::pipeline::Pipeline;
use crate::types::{Sequence, Trigger};

/// Invokes one sequence on a fixed interval until shutdown.
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    sequence: Sequence,
    interval_secs: u64,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(
        pipeline: Arc<Pipeline>,
        sequence: Sequence,
        interval_secs: u64,
        shutdown: CancellationToken,
    ) -> Self {
        Self { pipeline, sequence, interval_secs, shutdown }
    }

    pub async fn run(self) {
        if self.interval_secs == 0 {
            info!(sequence = %self.sequence, "Scheduler disabled");
            return;
        }
        info!(sequence = %self.sequence, every_secs = self.interval_secs, "Scheduler started");

        let mut ticker = interval(Duration::from_secs(self.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // first tick completes immediately

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let cancel = self.shutdown.child_token();
            let resp = self
                .pipeline
                .invoke(self.sequence, Trigger::Schedule, Utc::now(), None, &cancel)
                .await;
            if !resp.is_success() {
                warn!(sequence = %self.sequence, status = resp.status_code, "Scheduled run failed");
            }
        }

        info!(sequence = %self.sequence, "Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::health::HealthState;
    use crate::api::latency::LatencyStats;
    use crate::config::test_config;
    use crate::error::AppError;
    use crate::fetcher::mock::StaticFeed;
    use crate::query::mock::ScriptedEngine;
    use crate::query::QueryRunner;
    use crate::storage::mock::MemoryObjectStore;

    fn pipeline_without_api_key(health: Arc<HealthState>) -> Arc<Pipeline> {
        let mut cfg = test_config();
        cfg.api_key = None;
        let feed = Arc::new(StaticFeed::new(Err(AppError::Cancelled)));
        let runner = QueryRunner::new(
            Arc::new(ScriptedEngine::new(Vec::new())),
            Arc::new(LatencyStats::new()),
        );
        Arc::new(Pipeline::new(
            cfg,
            feed,
            Arc::new(MemoryObjectStore::default()),
            runner,
            health,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_per_interval_until_cancelled() {
        let health = Arc::new(HealthState::new());
        let shutdown = CancellationToken::new();
        let scheduler = Scheduler::new(
            pipeline_without_api_key(health.clone()),
            Sequence::Ingest,
            60,
            shutdown.clone(),
        );
        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(health.failed_runs(), 0);

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(health.failed_runs(), 2);

        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(health.runs_in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_disables() {
        let health = Arc::new(HealthState::new());
        let scheduler = Scheduler::new(
            pipeline_without_api_key(health.clone()),
            Sequence::Summarize,
            0,
            CancellationToken::new(),
        );

        scheduler.run().await;
        assert_eq!(health.failed_runs(), 0);
    }
}
