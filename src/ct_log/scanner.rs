// src/ct_log/scanner.rs
//! Scan-pass execution against a single log
//!
//! `LogScanner` is the seam between the fetch engine and the controller:
//! the engine walks `[start_index, tree_size)`, applies the match policy
//! to every decoded entry and reports matches and progress through the
//! observer. The observer's match callbacks may suspend for as long as
//! they like (sink backpressure); the engine just waits.

use anyhow::anyhow;
use async_trait::async_trait;
use futures_util::future::try_join_all;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use super::client::CtLogClient;
use crate::cert_parser::CertificateParser;
use crate::error::ScanError;
use crate::matcher::MatchPolicy;
use crate::types::{EntryKind, LogEntry};

const DEFAULT_MAX_RETRIES: u32 = 3;

/// Parameters for one scan pass.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// First index to process.
    pub start_index: i64,
    /// Entries requested per get-entries call.
    pub batch_size: u64,
    /// Consecutive batches fetched concurrently.
    pub parallel_fetch: usize,
    /// Minimum spacing between on_progress callbacks.
    pub tick_interval: Duration,
}

/// Callbacks invoked by the engine during a pass, in index order.
#[async_trait]
pub trait ScanObserver: Send {
    async fn on_certificate(&mut self, entry: LogEntry) -> Result<(), ScanError>;

    async fn on_precertificate(&mut self, entry: LogEntry) -> Result<(), ScanError>;

    /// Periodic progress report: entries processed so far this pass.
    async fn on_progress(&mut self, processed: u64);
}

/// One full pass over the currently published portion of a log.
#[async_trait]
pub trait LogScanner: Send + Sync {
    /// Scan from `opts.start_index` up to the tree size observed at the
    /// start of the pass. Returns the number of entries processed; an
    /// observed cancellation ends the pass early with the partial count
    /// and no error.
    async fn scan(
        &self,
        opts: &ScanOptions,
        matcher: &MatchPolicy,
        observer: &mut dyn ScanObserver,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<u64, ScanError>;
}

/// RFC 6962 HTTP implementation of `LogScanner`.
pub struct HttpLogScanner {
    client: CtLogClient,
    max_retries: u32,
}

impl HttpLogScanner {
    pub fn new(client: CtLogClient) -> Self {
        Self {
            client,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(client: CtLogClient, max_retries: u32) -> Self {
        Self {
            client,
            max_retries,
        }
    }
}

/// Plan up to `parallel` consecutive inclusive ranges covering
/// `[next, tree_size)` in `batch_size` steps.
fn plan_windows(next: u64, tree_size: u64, batch_size: u64, parallel: usize) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    let mut cursor = next;

    for _ in 0..parallel.max(1) {
        if cursor >= tree_size {
            break;
        }
        let end = std::cmp::min(cursor + batch_size, tree_size) - 1;
        ranges.push((cursor, end));
        cursor = end + 1;
    }

    ranges
}

#[async_trait]
impl LogScanner for HttpLogScanner {
    async fn scan(
        &self,
        opts: &ScanOptions,
        matcher: &MatchPolicy,
        observer: &mut dyn ScanObserver,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<u64, ScanError> {
        if *cancel.borrow() {
            return Ok(0);
        }

        // Tree size is sampled once; entries appended during the pass
        // are picked up by the next pass.
        let sth = tokio::select! {
            sth = self.client.get_sth_with_retry(self.max_retries) => {
                sth.map_err(|e| ScanError::Fetch { source: e })?
            }
            _ = cancel.changed() => {
                debug!("Scan cancelled while fetching STH");
                return Ok(0);
            }
        };

        let tree_size = sth.tree_size;
        let start = opts.start_index.max(0) as u64;

        if start >= tree_size {
            debug!(
                "{}: Up to date (start_index={}, tree_size={})",
                self.client.base_url(),
                start,
                tree_size
            );
            return Ok(0);
        }

        info!(
            "{}: Scanning entries {}-{} ({} total)",
            self.client.base_url(),
            start,
            tree_size - 1,
            tree_size - start
        );

        let mut next = start;
        let mut processed: u64 = 0;
        let mut last_tick = Instant::now();

        while next < tree_size {
            if *cancel.borrow() {
                debug!("Scan cancelled at index {}", next);
                return Ok(processed);
            }

            let ranges = plan_windows(next, tree_size, opts.batch_size, opts.parallel_fetch);

            let fetches = ranges
                .iter()
                .map(|(s, e)| self.client.get_entries_with_retry(*s, *e, self.max_retries));

            let batches = tokio::select! {
                batches = try_join_all(fetches) => {
                    batches.map_err(|e| ScanError::Fetch { source: e })?
                }
                _ = cancel.changed() => {
                    debug!("Scan cancelled mid-fetch at index {}", next);
                    return Ok(processed);
                }
            };

            for ((range_start, range_end), batch) in ranges.iter().zip(batches) {
                if batch.is_empty() {
                    return Err(ScanError::Fetch {
                        source: anyhow!(
                            "log returned no entries for range {}-{}",
                            range_start,
                            range_end
                        ),
                    });
                }

                for (offset, raw) in batch.iter().enumerate() {
                    let index = (*range_start + offset as u64) as i64;

                    let entry = CertificateParser::parse_log_entry(
                        index,
                        &raw.leaf_input,
                        &raw.extra_data,
                    )
                    .map_err(|e| ScanError::MalformedEntry {
                        index,
                        reason: e.to_string(),
                    })?;

                    if matcher.matches(&entry) {
                        match entry.kind {
                            EntryKind::Certificate => observer.on_certificate(entry).await?,
                            EntryKind::Precertificate => {
                                observer.on_precertificate(entry).await?
                            }
                        }
                    }

                    processed += 1;
                }

                let got = batch.len() as u64;
                let expected = range_end - range_start + 1;
                next = range_start + got;

                if last_tick.elapsed() >= opts.tick_interval {
                    observer.on_progress(processed).await;
                    last_tick = Instant::now();
                }

                if got < expected {
                    // Log served a short batch. Later prefetched ranges
                    // would skip the gap, so replan from the new frontier.
                    debug!(
                        "{}: Short batch at {} ({}/{} entries), replanning",
                        self.client.base_url(),
                        range_start,
                        got,
                        expected
                    );
                    break;
                }
            }
        }

        info!(
            "{}: Pass complete, {} entries processed",
            self.client.base_url(),
            processed
        );

        Ok(processed)
    }
}
