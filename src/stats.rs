// src/stats.rs
//! Run counters shared across scan and sink tasks

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Thread-safe counters for a monitor run.
#[derive(Clone)]
pub struct ScanStats {
    entries_processed: Arc<AtomicU64>,
    matches_found: Arc<AtomicU64>,
    start_time: Instant,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub entries_processed: u64,
    pub matches_found: u64,
    pub entries_per_minute: f64,
    pub uptime_secs: u64,
}

impl ScanStats {
    pub fn new() -> Self {
        Self {
            entries_processed: Arc::new(AtomicU64::new(0)),
            matches_found: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn add_processed(&self, count: u64) {
        self.entries_processed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_matches(&self) {
        self.matches_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self.start_time.elapsed();
        let processed = self.entries_processed.load(Ordering::Relaxed);
        let matches = self.matches_found.load(Ordering::Relaxed);

        let rate = if elapsed.as_secs() > 0 {
            (processed as f64 / elapsed.as_secs() as f64) * 60.0
        } else {
            0.0
        };

        StatsSnapshot {
            entries_processed: processed,
            matches_found: matches,
            entries_per_minute: rate,
            uptime_secs: elapsed.as_secs(),
        }
    }

    /// One-line summary for the end-of-run log.
    pub fn format_stats(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            "{} processed | {} matches | {:.1} entries/min | uptime: {}",
            snapshot.entries_processed,
            snapshot.matches_found,
            snapshot.entries_per_minute,
            Self::format_uptime(snapshot.uptime_secs)
        )
    }

    pub fn format_uptime(secs: u64) -> String {
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}

impl Default for ScanStats {
    fn default() -> Self {
        Self::new()
    }
}
