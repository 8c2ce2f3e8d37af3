// src/sink/mod.rs
//! Match delivery fan-out
//!
//! Every sink owns a bounded channel and a worker task. The controller
//! sends to each registered sink in turn and awaits every send, so a
//! slow sink applies backpressure to the whole pipeline instead of
//! growing an unbounded buffer. Workers treat `Quit` and a closed
//! channel the same way: flush and stop. Per-event delivery failures
//! are the sink's own problem and never abort the worker.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ScanError;
use crate::types::{LogEntry, MonEvent};

pub mod redis;
pub mod stdout;
pub mod store;
pub mod webhook;

pub use self::redis::RedisSink;
pub use stdout::{StdoutFormat, StdoutSink};
pub use store::StoreSink;
pub use webhook::WebhookSink;

/// Sink channel depth. Small on purpose: the buffer only smooths
/// bursts, backpressure is the flow control.
pub const SINK_CHANNEL_CAPACITY: usize = 16;

/// A delivery target for matched entries.
#[async_trait]
pub trait EventSink: Send + 'static {
    fn name(&self) -> &'static str;

    /// Deliver one matched entry. Errors are logged by the worker and
    /// do not stop consumption.
    async fn deliver(&mut self, entry: &LogEntry) -> anyhow::Result<()>;

    /// Flush buffered work before the worker exits.
    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Send side of a running sink, held by the controller.
#[derive(Clone)]
pub struct SinkHandle {
    name: &'static str,
    tx: mpsc::Sender<MonEvent>,
}

impl SinkHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Blocking send: waits while the sink's buffer is full. A closed
    /// channel means the worker is gone and the delivery guarantee is
    /// lost, which ends the run.
    pub async fn send(&self, event: MonEvent) -> Result<(), ScanError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| ScanError::SinkClosed { sink: self.name })
    }
}

/// Start the worker task for a sink and hand back its channel.
pub fn spawn_sink<S: EventSink>(mut sink: S) -> (SinkHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<MonEvent>(SINK_CHANNEL_CAPACITY);
    let name = sink.name();

    let worker = tokio::spawn(async move {
        debug!("Sink '{}' worker started", name);

        loop {
            match rx.recv().await {
                Some(MonEvent::CertificateMatch(entry))
                | Some(MonEvent::PrecertificateMatch(entry)) => {
                    if let Err(e) = sink.deliver(&entry).await {
                        warn!(
                            "Sink '{}' failed to deliver entry {}: {}",
                            name, entry.index, e
                        );
                    }
                }
                Some(MonEvent::Quit) | None => {
                    if let Err(e) = sink.close().await {
                        warn!("Sink '{}' close error: {}", name, e);
                    }
                    break;
                }
            }
        }

        debug!("Sink '{}' worker stopped", name);
    });

    (SinkHandle { name, tx }, worker)
}
