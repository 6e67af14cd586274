//! SinkHandle - manages a sink with isolated queue and worker task

use std::sync::{Arc, Mutex, PoisonError};

use contracts::{CaptureEvent, DataSink};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, trace, warn};

use crate::metrics::{Outcome, SinkMetrics};

/// Handle to a running sink worker
///
/// `try_send` is safe to call from plain threads; only `spawn` and
/// `shutdown` need the tokio runtime.
pub struct SinkHandle {
    /// Sink name
    name: String,
    /// Whether inter-frame motion events are forwarded
    forward_motion: bool,
    /// Channel to send events to worker, `None` once shut down
    tx: Mutex<Option<mpsc::Sender<CaptureEvent>>>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// Worker task handle
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S: DataSink + Send + 'static>(
        sink: S,
        queue_capacity: usize,
        forward_motion: bool,
    ) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            forward_motion,
            tx: Mutex::new(Some(tx)),
            metrics,
            worker_handle: Mutex::new(Some(worker_handle)),
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Whether this sink wants `event`
    pub fn accepts(&self, event: &CaptureEvent) -> bool {
        self.forward_motion || !matches!(event, CaptureEvent::Motion(_))
    }

    /// Send an event to the sink (non-blocking)
    ///
    /// Returns true if sent, false if queue full (event dropped) or the
    /// worker is gone.
    pub fn try_send(&self, event: CaptureEvent) -> bool {
        if !self.accepts(&event) {
            self.metrics.record(Outcome::Filtered);
            trace!(sink = %self.name, "motion event filtered");
            return true;
        }

        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            trace!(sink = %self.name, "sink shut down, event discarded");
            return false;
        };

        match tx.try_send(event) {
            Ok(()) => {
                self.metrics
                    .observe_queue(tx.max_capacity() - tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(e)) => {
                self.metrics.record(Outcome::Dropped);
                warn!(
                    sink = %self.name,
                    kind = e.kind(),
                    timestamp = e.timestamp(),
                    "Queue full, event dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                false
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Shutdown the sink worker gracefully
    ///
    /// Queued events are written before the worker exits. Idempotent.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(&self) {
        // Drop sender to signal worker to stop
        drop(
            self.tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let worker = self
            .worker_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // Wait for worker to finish
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(sink = %self.name, error = ?e, "Worker task panicked");
            }
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

impl std::fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkHandle")
            .field("name", &self.name)
            .field("forward_motion", &self.forward_motion)
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

/// Worker task that consumes events and writes to sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: DataSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<CaptureEvent>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(event) = rx.recv().await {
        metrics.observe_queue(rx.len());

        match sink.write(&event).await {
            Ok(()) => metrics.record(Outcome::Written),
            Err(e) => {
                metrics.record(Outcome::Failed);
                error!(
                    sink = %name,
                    kind = event.kind(),
                    timestamp = event.timestamp(),
                    error = %e,
                    "Write failed"
                );
                // Continue processing - don't crash on single failure
            }
        }
    }

    // Cleanup
    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}
