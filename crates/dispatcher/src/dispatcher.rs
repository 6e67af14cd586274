//! Dispatcher - fans capture events out to sinks

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use contracts::{CaptureEvent, ContractError, EventSink, SinkConfig, SinkType};
use tracing::{debug, info, instrument, trace};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::{MetricsSnapshot, Outcome};
use crate::sinks::LogSink;

/// Builder for creating a Dispatcher
#[derive(Debug, Default)]
pub struct DispatcherBuilder {
    configs: Vec<SinkConfig>,
    handles: Vec<SinkHandle>,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add sinks described by configuration
    pub fn with_configs(mut self, configs: impl IntoIterator<Item = SinkConfig>) -> Self {
        self.configs.extend(configs);
        self
    }

    /// Add an already running sink
    pub fn with_handle(mut self, handle: SinkHandle) -> Self {
        self.handles.push(handle);
        self
    }

    /// Build and start the dispatcher
    ///
    /// Must be called from within a tokio runtime: each configured sink gets
    /// its own worker task.
    #[instrument(
        name = "dispatcher_builder_build",
        skip(self),
        fields(configured = self.configs.len(), prebuilt = self.handles.len())
    )]
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        {
            let mut names = HashSet::new();
            let existing = self.handles.iter().map(|h| h.name());
            for name in existing.chain(self.configs.iter().map(|c| c.name.as_str())) {
                if !names.insert(name) {
                    return Err(DispatcherError::DuplicateSink {
                        name: name.to_string(),
                    });
                }
            }
        }

        let mut handles = self.handles;
        for config in &self.configs {
            handles.push(create_sink_handle(config)?);
        }
        Ok(Dispatcher::with_handles(handles))
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    if config.queue_capacity == 0 {
        return Err(DispatcherError::sink_creation(
            &config.name,
            "queue_capacity must be positive",
        ));
    }
    match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::new(&config.name);
            Ok(SinkHandle::spawn(
                sink,
                config.queue_capacity,
                config.forward_motion,
            ))
        }
    }
}

/// Fans events out to every sink without blocking the capture thread
///
/// Each sink owns a bounded queue; a slow or failing sink only loses its own
/// events.
#[derive(Debug)]
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    events: AtomicU64,
    closed: AtomicBool,
}

impl Dispatcher {
    /// Create a dispatcher with custom sink handles (for testing)
    pub fn with_handles(handles: Vec<SinkHandle>) -> Self {
        info!(sinks = handles.len(), "Dispatcher started");
        Self {
            handles,
            events: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    pub fn sink_count(&self) -> usize {
        self.handles.len()
    }

    /// Events accepted so far
    pub fn event_count(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    fn dispatch(&self, event: CaptureEvent) -> usize {
        let mut delivered = 0;
        for handle in &self.handles {
            if !handle.accepts(&event) {
                handle.metrics().record(Outcome::Filtered);
                continue;
            }
            let ok = handle.try_send(event.clone());
            observability::record_event_dispatched(handle.name(), ok);
            if ok {
                delivered += 1;
            }
        }
        delivered
    }

    /// Drain every sink queue and stop the workers. Idempotent.
    ///
    /// Events emitted afterwards are rejected.
    #[instrument(name = "dispatcher_shutdown", skip(self))]
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            events = self.event_count(),
            "Dispatcher closing, shutting down sinks"
        );
        for handle in &self.handles {
            handle.shutdown().await;
        }
        info!("Dispatcher shutdown complete");
    }
}

impl EventSink for Dispatcher {
    fn name(&self) -> &str {
        "dispatcher"
    }

    fn emit(&self, event: CaptureEvent) -> Result<(), ContractError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ContractError::SinkClosed {
                sink_name: self.name().to_string(),
            });
        }

        let count = self.events.fetch_add(1, Ordering::Relaxed) + 1;
        let targeted = self.handles.iter().filter(|h| h.accepts(&event)).count();
        let kind = event.kind();
        let delivered = self.dispatch(event);
        trace!(kind, targeted, delivered, "event dispatched");

        if count.is_multiple_of(100) {
            debug!(events = count, "Dispatcher progress");
        }

        if targeted > 0 && delivered == 0 {
            return Err(ContractError::sink_write(
                self.name(),
                format!("{kind} event dropped by all {targeted} sinks"),
            ));
        }
        Ok(())
    }
}

/// Convenience function to create a dispatcher from sink configs
#[instrument(name = "dispatcher_create", skip(sink_configs))]
pub fn create_dispatcher(sink_configs: Vec<SinkConfig>) -> Result<Dispatcher, DispatcherError> {
    DispatcherBuilder::new().with_configs(sink_configs).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::ChannelSink;
    use contracts::{CaptureMode, CompositeObservation, FrameSet, MotionEvent, MotionSample};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn observation(sequence: u64) -> CaptureEvent {
        CaptureEvent::Observation(CompositeObservation {
            sequence,
            frameset: FrameSet {
                mode: CaptureMode::RgbDepth,
                timestamp: sequence as f64,
                frames: BTreeMap::new(),
                received: 0,
            },
            timestamp: sequence as f64,
            timestamp_s: sequence as f64 / 1000.0,
            clock_corrected: false,
            interpolated_pose: None,
            interpolated_motion: None,
            odometry: None,
        })
    }

    fn motion(timestamp: f64) -> CaptureEvent {
        CaptureEvent::Motion(MotionEvent {
            timestamp,
            timestamp_s: timestamp / 1000.0,
            gyro: MotionSample::gyro(0.0, 0.0, 0.0),
            accel: MotionSample::accel(0.0, 0.0, 9.81),
        })
    }

    fn log_config(name: &str, forward_motion: bool) -> SinkConfig {
        SinkConfig {
            name: name.to_string(),
            sink_type: SinkType::Log,
            queue_capacity: 50,
            forward_motion,
        }
    }

    #[tokio::test]
    async fn test_dispatcher_fanout() {
        let (sink1, mut rx1) = ChannelSink::new("sink1", 10);
        let (sink2, mut rx2) = ChannelSink::new("sink2", 10);

        let dispatcher = DispatcherBuilder::new()
            .with_handle(SinkHandle::spawn(sink1, 10, true))
            .with_handle(SinkHandle::spawn(sink2, 10, false))
            .build()
            .unwrap();

        for i in 0..5 {
            dispatcher.emit(observation(i)).unwrap();
        }
        dispatcher.emit(motion(4.5)).unwrap();
        dispatcher.shutdown().await;

        let mut first = Vec::new();
        while let Some(event) = rx1.recv().await {
            first.push(event.kind());
        }
        let mut second = Vec::new();
        while let Some(event) = rx2.recv().await {
            second.push(event.kind());
        }
        assert_eq!(first.len(), 6);
        assert_eq!(first.last(), Some(&"motion"));
        assert_eq!(second, vec!["observation"; 5]);
        assert_eq!(dispatcher.event_count(), 6);
    }

    #[tokio::test]
    async fn test_create_dispatcher_from_config() {
        let dispatcher =
            create_dispatcher(vec![log_config("log", true), log_config("frames", false)]).unwrap();
        assert_eq!(dispatcher.sink_count(), 2);

        dispatcher.emit(observation(1)).unwrap();
        dispatcher.emit(motion(2.0)).unwrap();
        dispatcher.shutdown().await;

        let metrics: BTreeMap<_, _> = dispatcher.metrics().into_iter().collect();
        assert_eq!(metrics["log"].written, 2);
        assert_eq!(metrics["frames"].written, 1);
        assert_eq!(metrics["frames"].filtered, 1);
    }

    #[tokio::test]
    async fn test_duplicate_sink_names_rejected() {
        let err =
            create_dispatcher(vec![log_config("a", true), log_config("a", true)]).unwrap_err();
        assert!(matches!(err, DispatcherError::DuplicateSink { name } if name == "a"));
    }

    #[tokio::test]
    async fn test_zero_capacity_rejected() {
        let mut config = log_config("tiny", true);
        config.queue_capacity = 0;
        assert!(matches!(
            create_dispatcher(vec![config]),
            Err(DispatcherError::SinkCreation { .. })
        ));
    }

    #[tokio::test]
    async fn test_emit_after_shutdown_fails() {
        let dispatcher = Arc::new(create_dispatcher(vec![log_config("log", true)]).unwrap());
        dispatcher.shutdown().await;
        dispatcher.shutdown().await;

        let err = dispatcher.emit(observation(1)).unwrap_err();
        assert!(matches!(err, ContractError::SinkClosed { .. }));
    }

    #[tokio::test]
    async fn test_all_sinks_full_reports_error() {
        // Receiver kept but never read: the worker blocks after one event
        let (sink, _rx) = ChannelSink::new("stuck", 1);
        let dispatcher = Dispatcher::with_handles(vec![SinkHandle::spawn(sink, 1, true)]);

        let results: Vec<_> = (0..10).map(|i| dispatcher.emit(observation(i))).collect();
        assert!(results[0].is_ok());
        assert!(results.iter().any(|r| matches!(r, Err(ContractError::SinkWrite { .. }))));
    }
}
