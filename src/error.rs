// src/error.rs
//! Error taxonomy for the monitor pipeline
//!
//! Two layers: `ScanError` covers everything that can end a scan pass
//! (fetch failures, undecodable entries, a sink whose worker is gone),
//! `MonitorError` covers the run as a whole. Ordinary I/O plumbing keeps
//! using `anyhow` with context; these types exist so the process boundary
//! can tell a failed scan from a shutdown that overran its grace period.

use std::time::Duration;
use thiserror::Error;

/// Error that terminates the current scan run.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("log fetch failed: {source}")]
    Fetch {
        #[source]
        source: anyhow::Error,
    },

    #[error("malformed log entry at index {index}: {reason}")]
    MalformedEntry { index: i64, reason: String },

    #[error("sink '{sink}' channel closed, delivery guarantee lost")]
    SinkClosed { sink: &'static str },
}

/// Top-level outcome of a monitor run.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("monitor did not stop within {0:?} after cancellation")]
    ShutdownTimeout(Duration),

    #[error("monitor task panicked")]
    Panicked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::MalformedEntry {
            index: 42,
            reason: "leaf too short".to_string(),
        };
        assert!(err.to_string().contains("index 42"));

        let err = ScanError::SinkClosed { sink: "webhook" };
        assert!(err.to_string().contains("webhook"));
    }

    #[test]
    fn test_scan_error_converts_to_monitor_error() {
        let scan = ScanError::Fetch {
            source: anyhow::anyhow!("connection refused"),
        };
        let monitor: MonitorError = scan.into();
        assert!(matches!(monitor, MonitorError::Scan(_)));
        assert!(monitor.to_string().contains("connection refused"));
    }

    #[test]
    fn test_shutdown_timeout_is_distinct() {
        let err = MonitorError::ShutdownTimeout(Duration::from_secs(5));
        assert!(!matches!(err, MonitorError::Scan(_)));
        assert!(err.to_string().contains("5s"));
    }
}
