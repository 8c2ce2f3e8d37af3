// src/supervisor.rs
//! Run lifecycle: spawn, cancel, bounded shutdown
//!
//! The supervisor owns the cancellation channel and the controller
//! task. On an interrupt it signals cancellation and waits out a grace
//! period; a controller that cannot wind down in time is abandoned and
//! the timeout is reported instead of whatever it might still return.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use crate::error::MonitorError;
use crate::monitor::{RunSummary, ScanCycleController};

/// How long a cancelled run gets to finish before it is written off.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Supervisor {
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<Result<RunSummary, MonitorError>>,
    grace: Duration,
}

impl Supervisor {
    /// Start the controller as an independently cancellable task.
    pub fn spawn(controller: ScanCycleController) -> Self {
        Self::spawn_with_grace(controller, SHUTDOWN_GRACE)
    }

    pub fn spawn_with_grace(controller: ScanCycleController, grace: Duration) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(controller.run(cancel_rx));

        Self {
            cancel_tx,
            task,
            grace,
        }
    }

    /// Wait for the run to finish on its own, or until `interrupt`
    /// resolves; then request cancellation and wait out the grace
    /// period.
    pub async fn run_until<F>(mut self, interrupt: F) -> Result<RunSummary, MonitorError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        tokio::select! {
            result = &mut self.task => flatten(result),
            _ = &mut interrupt => {
                info!("Interrupt received, cancelling monitor");
                let _ = self.cancel_tx.send(true);

                match tokio::time::timeout(self.grace, &mut self.task).await {
                    Ok(result) => flatten(result),
                    Err(_) => {
                        warn!(
                            "Monitor did not stop within {:?}, abandoning the task",
                            self.grace
                        );
                        self.task.abort();
                        Err(MonitorError::ShutdownTimeout(self.grace))
                    }
                }
            }
        }
    }
}

fn flatten(
    result: Result<Result<RunSummary, MonitorError>, JoinError>,
) -> Result<RunSummary, MonitorError> {
    match result {
        Ok(inner) => inner,
        Err(e) => {
            warn!("Monitor task did not finish cleanly: {}", e);
            Err(MonitorError::Panicked)
        }
    }
}
