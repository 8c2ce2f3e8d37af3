// src/monitor.rs
//! Scan-cycle orchestration and match fan-out
//!
//! The controller drives repeated passes over the log through a
//! `LogScanner`, hands every matched entry to every registered sink in
//! a fixed order, and keeps the resume checkpoint moving. One private
//! cursor is the single source of truth: tick-time saves, the
//! end-of-pass save and the next pass's start index all derive from it,
//! and it never moves backwards.

use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::ct_log::{LogScanner, ScanObserver, ScanOptions};
use crate::error::{MonitorError, ScanError};
use crate::matcher::MatchPolicy;
use crate::sink::SinkHandle;
use crate::stats::ScanStats;
use crate::types::{LogEntry, MonEvent};

/// Pacing knobs for a run.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Entries requested per get-entries call.
    pub batch_size: u64,
    /// Consecutive batches fetched concurrently.
    pub parallel_fetch: usize,
    /// Spacing between checkpoint ticks within a pass.
    pub tick_interval: Duration,
    /// Pause between passes; `None` runs a single pass and returns.
    pub rescan_interval: Option<Duration>,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            parallel_fetch: 2,
            tick_interval: Duration::from_secs(30),
            rescan_interval: None,
        }
    }
}

/// Everything a run needs, resolved before the first pass.
///
/// Constructed once at startup and read-only afterwards; the only value
/// that advances during the run is the controller's private cursor.
pub struct RunState {
    start_index: i64,
    sinks: Vec<SinkHandle>,
    policy: Arc<MatchPolicy>,
    checkpoint: Arc<dyn CheckpointStore>,
}

impl std::fmt::Debug for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunState")
            .field("start_index", &self.start_index)
            .field("sink_count", &self.sinks.len())
            .finish_non_exhaustive()
    }
}

impl RunState {
    /// Assemble the run state. Rejects an empty sink registry: a run
    /// with nobody consuming matches has no reason to start.
    pub fn new(
        start_index: i64,
        sinks: Vec<SinkHandle>,
        policy: Arc<MatchPolicy>,
        checkpoint: Arc<dyn CheckpointStore>,
    ) -> Result<Self, MonitorError> {
        if sinks.is_empty() {
            return Err(MonitorError::Config(
                "no sinks registered, matches would have nowhere to go".to_string(),
            ));
        }

        Ok(Self {
            start_index,
            sinks,
            policy,
            checkpoint,
        })
    }

    pub fn start_index(&self) -> i64 {
        self.start_index
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

/// What a finished run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub passes: u64,
    pub entries_processed: u64,
    pub matches_dispatched: u64,
    /// Index the next run would start from.
    pub final_index: i64,
    /// True when the run ended because cancellation was requested.
    pub cancelled: bool,
}

/// Where scanning starts: the persisted checkpoint or the configured
/// override, whichever is further along.
pub async fn resolve_start_index(
    checkpoint: &dyn CheckpointStore,
    configured: i64,
) -> anyhow::Result<i64> {
    let persisted = checkpoint
        .load()
        .await
        .context("Failed to load checkpoint")?
        .unwrap_or(0);

    Ok(persisted.max(configured))
}

/// Drives scan passes against the log, fans matches out to the sinks
/// and advances the checkpoint.
pub struct ScanCycleController {
    scanner: Arc<dyn LogScanner>,
    state: RunState,
    options: MonitorOptions,
    stats: ScanStats,
}

impl ScanCycleController {
    pub fn new(scanner: Arc<dyn LogScanner>, state: RunState, options: MonitorOptions) -> Self {
        Self {
            scanner,
            state,
            options,
            stats: ScanStats::new(),
        }
    }

    /// Shared view of the run counters, valid after the controller has
    /// been consumed by the run.
    pub fn stats(&self) -> ScanStats {
        self.stats.clone()
    }

    /// Run passes until done, cancelled or broken by a scan error.
    /// Whatever the exit path, every sink receives exactly one `Quit`
    /// before this returns.
    pub async fn run(self, mut cancel: watch::Receiver<bool>) -> Result<RunSummary, MonitorError> {
        info!(
            "Monitor starting at index {} with {} sink(s)",
            self.state.start_index,
            self.state.sinks.len()
        );

        let outcome = self.run_passes(&mut cancel).await;

        for sink in &self.state.sinks {
            if let Err(e) = sink.send(MonEvent::Quit).await {
                warn!("Sink '{}' was gone before quit delivery: {}", sink.name(), e);
            }
        }

        match outcome {
            Ok(summary) => {
                info!(
                    "Monitor finished after {} pass(es): {}",
                    summary.passes,
                    self.stats.format_stats()
                );
                Ok(summary)
            }
            Err(e) => {
                error!("Monitor run failed: {}", e);
                Err(e.into())
            }
        }
    }

    async fn run_passes(
        &self,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<RunSummary, ScanError> {
        let mut summary = RunSummary {
            passes: 0,
            entries_processed: 0,
            matches_dispatched: 0,
            final_index: self.state.start_index,
            cancelled: false,
        };

        let mut cursor = self.state.start_index;

        loop {
            if *cancel.borrow() {
                summary.cancelled = true;
                break;
            }

            let pass_start = cursor;
            let opts = ScanOptions {
                start_index: pass_start,
                batch_size: self.options.batch_size,
                parallel_fetch: self.options.parallel_fetch,
                tick_interval: self.options.tick_interval,
            };

            let mut dispatcher = EventDispatcher {
                sinks: &self.state.sinks,
                checkpoint: self.state.checkpoint.as_ref(),
                stats: &self.stats,
                pass_start,
                matches: 0,
            };

            debug!("Pass {} starting at index {}", summary.passes + 1, pass_start);

            let processed = self
                .scanner
                .scan(&opts, &self.state.policy, &mut dispatcher, cancel)
                .await?;

            summary.passes += 1;
            summary.entries_processed += processed;
            summary.matches_dispatched += dispatcher.matches;
            self.stats.add_processed(processed);

            // A pass can only move the cursor forward
            cursor = cursor.max(pass_start + processed as i64);
            summary.final_index = cursor;

            if let Err(e) = self.state.checkpoint.save(cursor).await {
                warn!("Checkpoint save failed at index {}: {}", cursor, e);
            }

            if *cancel.borrow() {
                summary.cancelled = true;
                break;
            }

            let interval = match self.options.rescan_interval {
                Some(interval) => interval,
                None => break,
            };

            debug!("Pass complete, next scan in {:?}", interval);

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = cancel.changed() => {
                    // The channel only ever carries `true`; a dropped
                    // sender counts as cancellation too.
                    if changed.is_err() || *cancel.borrow() {
                        summary.cancelled = true;
                        break;
                    }
                }
            }
        }

        Ok(summary)
    }
}

/// Per-pass observer wired into the scanner: fans matched entries out
/// to every sink and persists tick progress.
///
/// Sends are sequential and block on a full sink buffer, so per-sink
/// delivery order equals discovery order and a stalled sink stalls
/// ingestion instead of dropping or reordering events.
struct EventDispatcher<'a> {
    sinks: &'a [SinkHandle],
    checkpoint: &'a dyn CheckpointStore,
    stats: &'a ScanStats,
    pass_start: i64,
    matches: u64,
}

impl EventDispatcher<'_> {
    async fn dispatch(&mut self, entry: LogEntry) -> Result<(), ScanError> {
        debug!("Match at index {} ({})", entry.index, entry.kind);

        let event = MonEvent::matched(Arc::new(entry));
        for sink in self.sinks {
            sink.send(event.clone()).await?;
        }

        self.matches += 1;
        self.stats.increment_matches();
        Ok(())
    }
}

#[async_trait]
impl ScanObserver for EventDispatcher<'_> {
    async fn on_certificate(&mut self, entry: LogEntry) -> Result<(), ScanError> {
        self.dispatch(entry).await
    }

    async fn on_precertificate(&mut self, entry: LogEntry) -> Result<(), ScanError> {
        self.dispatch(entry).await
    }

    async fn on_progress(&mut self, processed: u64) {
        let index = self.pass_start + processed as i64;

        if let Err(e) = self.checkpoint.save(index).await {
            warn!("Checkpoint save failed at index {}: {}", index, e);
        }
    }
}
