use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::latency::LatencyStats;
use crate::config::QUERY_POLL_INTERVAL_SECS;
use crate::error::{AppError, Result};
use crate::query::{QueryEngine, QueryExecution, QueryState, ResultGrid};

const NO_REASON: &str = "no reason";

/// Drives one statement at a time through submit → poll → results.
#[derive(Clone)]
pub struct QueryRunner {
    engine: Arc<dyn QueryEngine>,
    latency: Arc<LatencyStats>,
    poll_interval: Duration,
}

impl QueryRunner {
    pub fn new(engine: Arc<dyn QueryEngine>, latency: Arc<LatencyStats>) -> Self {
        Self {
            engine,
            latency,
            poll_interval: Duration::from_secs(QUERY_POLL_INTERVAL_SECS),
        }
    }

    /// Submit a statement. A rejected statement is not retried.
    pub async fn submit(&self, sql: &str, database: &str) -> Result<QueryExecution> {
        let id = self.engine.start_execution(sql, database).await?;
        info!(execution_id = %id, database, "Started query: {id}");
        Ok(QueryExecution {
            id,
            state: QueryState::Submitted,
            reason: None,
        })
    }

    /// Poll until the execution reaches a terminal state.
    ///
    /// Results are fetched exactly once, after SUCCEEDED is observed. There is
    /// no poll limit; `cancel` is the only way out of a query that never
    /// finishes. A cancelled wait abandons the execution without asking the
    /// engine to stop it.
    pub async fn poll_until_terminal(
        &self,
        mut execution: QueryExecution,
        cancel: &CancellationToken,
    ) -> Result<ResultGrid> {
        loop {
            if cancel.is_cancelled() {
                warn!(execution_id = %execution.id, "poll cancelled, abandoning execution");
                return Err(AppError::Cancelled);
            }

            let status = self.engine.get_execution(&execution.id).await?;
            execution.state = status.state;
            execution.reason = status.reason;
            info!(execution_id = %execution.id, state = %execution.state, "Query state: {}", execution.state);

            match execution.state {
                QueryState::Succeeded => break,
                QueryState::Failed => {
                    return Err(AppError::QueryFailed {
                        execution_id: execution.id,
                        reason: execution.reason.unwrap_or_else(|| NO_REASON.to_string()),
                    });
                }
                QueryState::Cancelled => {
                    return Err(AppError::QueryCancelled {
                        execution_id: execution.id,
                        reason: execution.reason.unwrap_or_else(|| NO_REASON.to_string()),
                    });
                }
                QueryState::Submitted | QueryState::Running => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(execution_id = %execution.id, "poll cancelled, abandoning execution");
                    return Err(AppError::Cancelled);
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        let grid = self.engine.get_results(&execution.id).await?;
        debug!(execution_id = %execution.id, rows = grid.rows.len(), "fetched query results");
        Ok(grid)
    }

    /// Submit and wait for one statement, recording its wall time.
    pub async fn run(&self, sql: &str, database: &str, cancel: &CancellationToken) -> Result<ResultGrid> {
        let started = Instant::now();
        let execution = self.submit(sql, database).await?;
        let result = self.poll_until_terminal(execution, cancel).await;
        if !matches!(result, Err(AppError::Cancelled)) {
            self.latency.record(started.elapsed());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::mock::{Script, ScriptedEngine};

    fn grid() -> ResultGrid {
        ResultGrid {
            rows: vec![vec![Some("n".to_string())], vec![Some("1".to_string())]],
        }
    }

    fn runner(engine: Arc<ScriptedEngine>) -> QueryRunner {
        QueryRunner::new(engine, Arc::new(LatencyStats::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn success_sleeps_between_intermediate_states() {
        let engine = Arc::new(ScriptedEngine::new(vec![Script::succeeds(
            &[QueryState::Submitted, QueryState::Running],
            grid(),
        )]));
        let runner = runner(engine.clone());

        let started = Instant::now();
        let result = runner
            .run("SELECT 1", "neo_db", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result, grid());
        // Two intermediate states → two 1s sleeps.
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert_eq!(
            engine.calls(),
            vec![
                "start:exec-1",
                "status:exec-1:SUBMITTED",
                "status:exec-1:RUNNING",
                "status:exec-1:SUCCEEDED",
                "results:exec-1",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_success_does_not_sleep() {
        let engine = Arc::new(ScriptedEngine::new(vec![Script::succeeds(&[], grid())]));
        let started = Instant::now();
        runner(engine.clone())
            .run("SELECT 1", "neo_db", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(engine.result_fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_carries_engine_reason() {
        let engine = Arc::new(ScriptedEngine::new(vec![Script::ends(
            &[QueryState::Submitted],
            QueryState::Failed,
            Some("syntax error"),
        )]));
        let err = runner(engine.clone())
            .run("SELEC 1", "neo_db", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::QueryFailed { .. }));
        assert!(err.to_string().contains("syntax error"));
        assert_eq!(engine.result_fetches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_without_reason_uses_placeholder() {
        let engine = Arc::new(ScriptedEngine::new(vec![Script::ends(
            &[QueryState::Submitted],
            QueryState::Failed,
            None,
        )]));
        let err = runner(engine)
            .run("SELECT 1", "neo_db", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no reason"));
    }

    #[tokio::test(start_paused = true)]
    async fn engine_cancellation_is_terminal() {
        let engine = Arc::new(ScriptedEngine::new(vec![Script::ends(
            &[QueryState::Running],
            QueryState::Cancelled,
            Some("user request"),
        )]));
        let err = runner(engine)
            .run("SELECT 1", "neo_db", &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            AppError::QueryCancelled { execution_id, reason } => {
                assert_eq!(execution_id, "exec-1");
                assert_eq!(reason, "user request");
            }
            other => panic!("expected QueryCancelled, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn engine_cancellation_without_reason_uses_placeholder() {
        let engine = Arc::new(ScriptedEngine::new(vec![Script::ends(
            &[QueryState::Submitted],
            QueryState::Cancelled,
            None,
        )]));
        let err = runner(engine.clone())
            .run("SELECT 1", "neo_db", &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            AppError::QueryCancelled { execution_id, reason } => {
                assert_eq!(execution_id, "exec-1");
                assert_eq!(reason, "no reason");
            }
            other => panic!("expected QueryCancelled, got {other:?}"),
        }
        assert_eq!(engine.result_fetches(), 0);
    }

    #[tokio::test]
    async fn rejected_submission_is_not_polled() {
        let engine = Arc::new(ScriptedEngine::new(vec![Script::rejected("mismatched input")]));
        let err = runner(engine.clone())
            .run("SELEC", "neo_db", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Submission(ref m) if m.contains("mismatched input")));
        assert_eq!(engine.calls(), Vec::<String>::new());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let engine = Arc::new(ScriptedEngine::new(vec![Script::stuck(QueryState::Running)]));
        let runner = runner(engine.clone());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3500)).await;
            trigger.cancel();
        });

        let err = runner.run("SELECT 1", "neo_db", &cancel).await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
        assert_eq!(engine.result_fetches(), 0);
        // Polled at t=0,1,2,3 before the cancel at 3.5s.
        assert_eq!(engine.status_polls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn records_latency_for_finished_queries() {
        let latency = Arc::new(LatencyStats::new());
        let engine = Arc::new(ScriptedEngine::new(vec![Script::succeeds(
            &[QueryState::Running],
            grid(),
        )]));
        QueryRunner::new(engine, latency.clone())
            .run("SELECT 1", "neo_db", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(latency.len(), 1);
    }
}
