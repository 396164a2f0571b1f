//! Shared health state for the /health endpoint.
//! Updated by the pipeline entry points, read by the API.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::types::Sequence;

#[derive(Default)]
pub struct HealthState {
    /// Runs currently executing.
    pub runs_in_flight: AtomicU64,
    /// Millisecond timestamp of the last successful ingest (0 = none).
    pub last_ingest_ok_ms: AtomicI64,
    /// Millisecond timestamp of the last successful summary (0 = none).
    pub last_summary_ok_ms: AtomicI64,
    pub failed_runs: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_started(&self) {
        self.runs_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn run_finished(&self, sequence: Sequence, succeeded: bool, at_ms: i64) {
        self.runs_in_flight.fetch_sub(1, Ordering::Relaxed);
        if !succeeded {
            self.failed_runs.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match sequence {
            Sequence::Ingest => self.last_ingest_ok_ms.store(at_ms, Ordering::Relaxed),
            Sequence::Summarize => self.last_summary_ok_ms.store(at_ms, Ordering::Relaxed),
        }
    }

    pub fn runs_in_flight(&self) -> u64 {
        self.runs_in_flight.load(Ordering::Relaxed)
    }

    pub fn last_ok_ms(&self, sequence: Sequence) -> Option<i64> {
        let v = match sequence {
            Sequence::Ingest => self.last_ingest_ok_ms.load(Ordering::Relaxed),
            Sequence::Summarize => self.last_summary_ok_ms.load(Ordering::Relaxed),
        };
        (v > 0).then_some(v)
    }

    pub fn failed_runs(&self) -> u64 {
        self.failed_runs.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_success_per_sequence() {
        let health = HealthState::new();
        health.run_started();
        health.run_started();
        assert_eq!(health.runs_in_flight(), 2);

        health.run_finished(Sequence::Ingest, true, 1_700_000_000_000);
        health.run_finished(Sequence::Summarize, false, 1_700_000_000_500);

        assert_eq!(health.runs_in_flight(), 0);
        assert_eq!(health.last_ok_ms(Sequence::Ingest), Some(1_700_000_000_000));
        assert_eq!(health.last_ok_ms(Sequence::Summarize), None);
        assert_eq!(health.failed_runs(), 1);
    }
}
