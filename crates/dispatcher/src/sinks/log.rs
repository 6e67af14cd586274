//! LogSink - logs event summary via tracing

use contracts::{CaptureEvent, CompositeObservation, ContractError, DataSink, MotionEvent};
use tracing::{debug, info, instrument};

/// Sink that logs event summaries for debugging
pub struct LogSink {
    name: String,
    observations: u64,
    motion_events: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            observations: 0,
            motion_events: 0,
        }
    }

    fn log_observation(&self, obs: &CompositeObservation) {
        info!(
            sink = %self.name,
            sequence = obs.sequence,
            timestamp = obs.timestamp,
            mode = ?obs.frameset.mode,
            frames = obs.frameset.len(),
            clock_corrected = obs.clock_corrected,
            pose = obs.interpolated_pose.is_some(),
            motion = obs.interpolated_motion.is_some(),
            "CompositeObservation received"
        );
    }

    fn log_motion(&self, event: &MotionEvent) {
        debug!(
            sink = %self.name,
            timestamp = event.timestamp,
            gyro_z = event.gyro.vector.z,
            accel_z = event.accel.vector.z,
            "MotionEvent received"
        );
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, event),
        fields(sink = %self.name, kind = event.kind())
    )]
    async fn write(&mut self, event: &CaptureEvent) -> Result<(), ContractError> {
        match event {
            CaptureEvent::Observation(obs) => {
                self.observations += 1;
                self.log_observation(obs);
            }
            CaptureEvent::Motion(motion) => {
                self.motion_events += 1;
                self.log_motion(motion);
            }
        }
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(
            sink = %self.name,
            observations = self.observations,
            motion_events = self.motion_events,
            "LogSink closed"
        );
        Ok(())
    }
}
