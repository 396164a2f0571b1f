//! In-memory latency histogram for query executions.
//! Records wall time from submission to terminal state, in milliseconds.

use std::sync::Mutex;
use std::time::Duration;

/// Shared latency stats. QueryRunner records, API reads.
pub struct LatencyStats {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

impl LatencyStats {
    /// Tracks 1ms to 24h, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 86_400_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record_ms(&self, ms: u64) {
        if let Ok(mut h) = self.inner.lock() {
            h.saturating_record(ms.max(1));
        }
    }

    pub fn record(&self, d: Duration) {
        let ms = d.as_millis().min(u128::from(u64::MAX)) as u64;
        self.record_ms(ms);
    }

    /// Return (p50_ms, p95_ms, p99_ms). None if no samples.
    pub fn percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        let Ok(h) = self.inner.lock() else {
            return (None, None, None);
        };
        if h.len() == 0 {
            return (None, None, None);
        }
        (
            Some(h.value_at_quantile(0.5)),
            Some(h.value_at_quantile(0.95)),
            Some(h.value_at_quantile(0.99)),
        )
    }

    pub fn max_ms(&self) -> Option<u64> {
        self.inner
            .lock()
            .ok()
            .filter(|h| h.len() > 0)
            .map(|h| h.max())
    }

    pub fn len(&self) -> u64 {
        self.inner.lock().map(|h| h.len()).unwrap_or(0)
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        let stats = LatencyStats::new();
        assert_eq!(stats.percentiles(), (None, None, None));
        assert_eq!(stats.max_ms(), None);
        assert_eq!(stats.len(), 0);
    }

    #[test]
    fn percentiles_follow_samples() {
        let stats = LatencyStats::new();
        for secs in 1..=100 {
            stats.record(Duration::from_secs(secs));
        }
        let (p50, p95, p99) = stats.percentiles();
        let p50 = p50.unwrap();
        assert!((49_000..=51_000).contains(&p50), "p50={p50}");
        assert!(p95.unwrap() >= p50);
        assert!(p99.unwrap() >= p95.unwrap());
        assert_eq!(stats.len(), 100);
    }

    #[test]
    fn sub_millisecond_samples_are_kept() {
        let stats = LatencyStats::new();
        stats.record(Duration::from_micros(200));
        assert_eq!(stats.len(), 1);
    }
}
