//! Capture façade: frameset assembly, clock correction, motion/pose
//! interpolation and inter-frame IMU replay.

use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{
    CaptureConfig, CaptureEvent, Clock, CompositeObservation, EventSink, MotionKind,
    MotionSample, OdometryEstimate, OutOfOrderPolicy, Pose3D, PoseSample, SensorPacket,
    SensorPayload, SensorSource, SourceEvent, StreamKind,
};
use nalgebra::Matrix6;
use tracing::{debug, info, instrument, trace, warn};

use crate::assembler::FrameSetAssembler;
use crate::buffer::SharedSeries;
use crate::clock_skew::ClockSkewGuard;
use crate::error::{CaptureError, ShutdownError};
use crate::frame_syncer::{FrameSender, FrameSyncer};
use crate::interpolator::TemporalInterpolator;

/// Push handle installed as the source callback.
///
/// Cheap to clone; every method returns without blocking.
#[derive(Debug, Clone)]
pub struct SensorInputs {
    frames: FrameSender,
    gyro: SharedSeries<MotionSample>,
    accel: SharedSeries<MotionSample>,
    pose: SharedSeries<PoseSample>,
    odometry_provided: bool,
}

impl SensorInputs {
    pub fn handle(&self, event: SourceEvent) {
        match event {
            SourceEvent::Packet(packet) => self.push(packet),
            SourceEvent::Disconnected { reason } => self.notify_disconnected(reason),
        }
    }

    /// Route one sample to its buffer
    pub fn push(&self, packet: SensorPacket) {
        let timestamp = packet.timestamp;
        match (packet.kind, packet.payload) {
            (kind, SensorPayload::Image(frame)) if kind.is_image() => self.frames.push(frame),
            (StreamKind::Gyro, SensorPayload::Motion(vector)) => self.gyro.push(
                timestamp,
                MotionSample {
                    kind: MotionKind::Gyro,
                    vector,
                },
            ),
            (StreamKind::Accel, SensorPayload::Motion(vector)) => self.accel.push(
                timestamp,
                MotionSample {
                    kind: MotionKind::Accel,
                    vector,
                },
            ),
            (StreamKind::Pose, SensorPayload::Pose(pose)) => {
                if self.odometry_provided {
                    self.pose.push(timestamp, pose);
                } else {
                    trace!(timestamp, "odometry not provided, dropping pose sample");
                }
            }
            (kind, _) => {
                debug!(%kind, timestamp, "payload does not match stream kind, dropping");
            }
        }
    }

    pub fn notify_disconnected(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "sensor source disconnected");
        self.frames.notify_disconnected(reason);
    }
}

/// Drives one capture per call and emits the results.
///
/// Must be used from a single consumer thread; `capture` takes `&mut self`.
pub struct CaptureOrchestrator {
    config: CaptureConfig,
    required: Vec<StreamKind>,
    source: Box<dyn SensorSource>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    assembler: FrameSetAssembler<FrameSyncer>,
    inputs: SensorInputs,
    interpolator: TemporalInterpolator,
    skew_guard: ClockSkewGuard,
    local_pose: Pose3D,
    started: bool,
    shut_down: bool,
    sequence: u64,
    last_capture: Option<f64>,
}

impl std::fmt::Debug for CaptureOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureOrchestrator")
            .field("source", &self.source.name())
            .field("sink", &self.sink.name())
            .field("mode", &self.config.mode)
            .field("started", &self.started)
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl CaptureOrchestrator {
    pub fn new(
        config: CaptureConfig,
        source: Box<dyn SensorSource>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let required = config.required_streams();
        let syncer = FrameSyncer::new(required.clone(), &config.assembly);
        let capacity = config.buffer.capacity;
        let inputs = SensorInputs {
            frames: syncer.sender(),
            gyro: SharedSeries::new(capacity),
            accel: SharedSeries::new(capacity),
            pose: SharedSeries::new(capacity),
            odometry_provided: config.odometry.provided,
        };

        Self {
            required,
            assembler: FrameSetAssembler::new(syncer, config.mode),
            inputs,
            interpolator: TemporalInterpolator::new(&config.interpolation),
            skew_guard: ClockSkewGuard::new(&config.clock),
            local_pose: config.odometry.local_pose(),
            source,
            clock,
            sink,
            config,
            started: false,
            shut_down: false,
            sequence: 0,
            last_capture: None,
        }
    }

    /// Reset one-time warnings and install the push callback on the source
    #[instrument(name = "orchestrator_start", skip(self), fields(source = self.source.name()))]
    pub fn start(&mut self) {
        self.interpolator.reset();
        self.skew_guard.reset();
        self.assembler.source_mut().reset();
        self.last_capture = None;

        let inputs = self.inputs.clone();
        self.source
            .listen(Arc::new(move |event: SourceEvent| inputs.handle(event)));
        self.started = true;
        self.shut_down = false;
        info!(
            mode = ?self.config.mode,
            required = ?self.required,
            inter_frame = self.config.replay.inter_frame,
            "capture started"
        );
    }

    /// Produce one composite observation
    ///
    /// # Errors
    /// `Timeout` when no complete frameset arrives before the assembly
    /// deadline, `Source` on hardware disconnect, `OutOfOrder` when replay
    /// rejects a non-advancing timestamp.
    #[instrument(name = "orchestrator_capture", skip(self), fields(sequence = self.sequence + 1))]
    pub fn capture(&mut self) -> Result<CompositeObservation, CaptureError> {
        if !self.started {
            return Err(CaptureError::NotStarted);
        }
        let started = Instant::now();
        let assembly = &self.config.assembly;
        let frameset = self
            .assembler
            .assemble(
                &self.required,
                Duration::from_millis(assembly.initial_timeout_ms),
                Duration::from_millis(assembly.retry_timeout_ms),
                Duration::try_from_secs_f64(assembly.deadline_s).unwrap_or_default(),
            )
            .map_err(|err| {
                let err = CaptureError::from(err);
                observability::record_capture_failure(failure_reason(&err));
                err
            })?;

        let correction = self
            .skew_guard
            .correct(frameset.timestamp, self.clock.now());
        let timestamp = correction.timestamp;
        let max_wait_ms = self.config.interpolation.max_wait_ms;

        let interpolated_pose = if self.config.odometry.provided && !self.inputs.pose.is_empty() {
            self.interpolator
                .resolve(&self.inputs.pose, timestamp, max_wait_ms)
                .ok()
                .map(|sample| sample.value)
        } else {
            None
        };
        let odometry = interpolated_pose.map(|pose| odometry_estimate(&self.local_pose, &pose));

        let interpolated_motion = if self.config.replay.inter_frame {
            if !self.inputs.gyro.is_empty() {
                self.replay_inter_frame(timestamp)?;
            }
            None
        } else {
            self.resolve_motion(timestamp, max_wait_ms)
        };

        self.sequence += 1;
        let observation = CompositeObservation {
            sequence: self.sequence,
            frameset,
            timestamp,
            timestamp_s: self.skew_guard.to_seconds(timestamp),
            clock_corrected: correction.corrected,
            interpolated_pose,
            interpolated_motion,
            odometry,
        };

        observability::record_capture_metrics(&observation, started.elapsed().as_secs_f64());
        self.record_buffer_depths();
        self.emit(CaptureEvent::Observation(observation.clone()));
        debug!(
            timestamp,
            frames = observation.frameset.len(),
            pose = observation.interpolated_pose.is_some(),
            motion = observation.interpolated_motion.is_some(),
            "observation captured"
        );
        Ok(observation)
    }

    fn resolve_motion(
        &mut self,
        timestamp: f64,
        max_wait_ms: u64,
    ) -> Option<(MotionSample, MotionSample)> {
        if self.inputs.gyro.is_empty() || self.inputs.accel.is_empty() {
            return None;
        }
        let gyro = self
            .interpolator
            .resolve(&self.inputs.gyro, timestamp, max_wait_ms)
            .ok()?;
        let accel = self
            .interpolator
            .resolve(&self.inputs.accel, timestamp, max_wait_ms)
            .ok()?;
        Some((gyro.value, accel.value))
    }

    /// Emit a motion event for every gyro sample strictly between the
    /// previous capture and `timestamp`
    #[instrument(name = "orchestrator_replay", level = "debug", skip(self))]
    fn replay_inter_frame(&mut self, timestamp: f64) -> Result<usize, CaptureError> {
        let Some(previous) = self.last_capture else {
            self.last_capture = Some(timestamp);
            return Ok(0);
        };

        if timestamp <= previous {
            match self.config.replay.out_of_order {
                OutOfOrderPolicy::Skip => {
                    warn!(
                        previous,
                        timestamp, "capture timestamp did not advance, skipping replay"
                    );
                    return Ok(0);
                }
                OutOfOrderPolicy::Resync => {
                    warn!(
                        previous,
                        timestamp, "capture timestamp did not advance, resyncing replay"
                    );
                    self.last_capture = Some(timestamp);
                    return Ok(0);
                }
                OutOfOrderPolicy::Reject => {
                    return Err(CaptureError::OutOfOrder {
                        previous,
                        current: timestamp,
                    });
                }
            }
        }

        let max_wait_ms = self.config.interpolation.max_wait_ms;
        let mut emitted = 0;
        for sample in self.inputs.gyro.samples_between(previous, timestamp) {
            let resolved = self
                .interpolator
                .resolve(&self.inputs.gyro, sample.timestamp, max_wait_ms)
                .and_then(|gyro| {
                    self.interpolator
                        .resolve(&self.inputs.accel, sample.timestamp, max_wait_ms)
                        .map(|accel| (gyro, accel))
                });
            let (gyro, accel) = match resolved {
                Ok(pair) => pair,
                Err(err) => {
                    debug!(timestamp = sample.timestamp, %err, "stopping inter-frame replay");
                    break;
                }
            };
            self.emit(CaptureEvent::Motion(contracts::MotionEvent {
                timestamp: sample.timestamp,
                timestamp_s: self.skew_guard.to_seconds(sample.timestamp),
                gyro: gyro.value,
                accel: accel.value,
            }));
            emitted += 1;
        }

        self.last_capture = Some(timestamp);
        observability::record_motion_events(emitted);
        trace!(previous, timestamp, emitted, "inter-frame replay done");
        Ok(emitted)
    }

    fn emit(&self, event: CaptureEvent) {
        let kind = event.kind();
        if let Err(err) = self.sink.emit(event) {
            warn!(sink = self.sink.name(), kind, error = %err, "failed to emit capture event");
            metrics::counter!("capture_sink_errors_total", "kind" => kind).increment(1);
        }
    }

    fn record_buffer_depths(&self) {
        observability::record_buffer_depth("gyro", self.inputs.gyro.len());
        observability::record_buffer_depth("accel", self.inputs.accel.len());
        observability::record_buffer_depth("pose", self.inputs.pose.len());
    }

    /// Stop the source
    ///
    /// Idempotent once it has succeeded. A failure is returned and the call
    /// may be retried.
    #[instrument(name = "orchestrator_shutdown", skip(self), fields(source = self.source.name()))]
    pub fn shutdown(&mut self) -> Result<(), ShutdownError> {
        if self.shut_down {
            return Ok(());
        }
        self.started = false;
        self.source
            .stop()
            .map_err(|source| ShutdownError::Source {
                name: self.source.name().to_string(),
                source,
            })?;
        self.shut_down = true;
        info!(
            captures = self.sequence,
            frames_dropped = self.frames_dropped(),
            "capture stopped"
        );
        Ok(())
    }

    /// Handle for pushing samples directly (bypassing the source callback)
    pub fn inputs(&self) -> SensorInputs {
        self.inputs.clone()
    }

    pub fn gyro_series(&self) -> &SharedSeries<MotionSample> {
        &self.inputs.gyro
    }

    pub fn accel_series(&self) -> &SharedSeries<MotionSample> {
        &self.inputs.accel
    }

    pub fn pose_series(&self) -> &SharedSeries<PoseSample> {
        &self.inputs.pose
    }

    pub fn interpolator(&self) -> &TemporalInterpolator {
        &self.interpolator
    }

    pub fn skew_guard(&self) -> &ClockSkewGuard {
        &self.skew_guard
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn required_streams(&self) -> &[StreamKind] {
        &self.required
    }

    /// Number of observations produced so far
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn frames_dropped(&self) -> u64 {
        self.inputs.frames.dropped_count()
    }
}

impl Drop for CaptureOrchestrator {
    fn drop(&mut self) {
        if self.started && !self.shut_down {
            warn!(
                source = self.source.name(),
                "orchestrator dropped without shutdown(), source left running"
            );
        }
    }
}

fn failure_reason(err: &CaptureError) -> &'static str {
    match err {
        CaptureError::Timeout { received: 0, .. } => "timeout",
        CaptureError::Timeout { .. } => "partial_data",
        CaptureError::Unroutable(_) => "unroutable",
        CaptureError::Source(_) => "source",
        CaptureError::OutOfOrder { .. } => "out_of_order",
        CaptureError::NotStarted => "not_started",
    }
}

/// Express a tracker pose in the base frame with a confidence-scaled
/// covariance.
///
/// Confidence runs 0 (failed) to 3 (high); each step down multiplies the
/// variances by ten.
pub fn odometry_estimate(local: &Pose3D, pose: &PoseSample) -> OdometryEstimate {
    let confidence = pose.confidence.min(3) as i32;
    let mut covariance = Matrix6::identity() * 1e-4;
    let linear = 10f64.powi(3 - confidence);
    let angular = 10f64.powi(1 - confidence);
    for i in 0..3 {
        covariance[(i, i)] *= linear;
        covariance[(i + 3, i + 3)] *= angular;
    }

    OdometryEstimate {
        pose: local * pose.transform * local.inverse(),
        covariance,
        confidence: pose.confidence,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;
    use bytes::Bytes;
    use contracts::{
        AssemblyConfig, CaptureMode, ContractError, ImageFrame, InterpolationConfig, ManualClock,
        PixelFormat, ReplayConfig, SensorDataCallback,
    };
    use nalgebra::{Translation3, UnitQuaternion, Vector3};

    #[derive(Default)]
    struct TestSource {
        listening: AtomicBool,
        fail_stop: bool,
    }

    impl SensorSource for TestSource {
        fn name(&self) -> &str {
            "test"
        }

        fn listen(&self, _callback: SensorDataCallback) {
            self.listening.store(true, Ordering::SeqCst);
        }

        fn stop(&self) -> Result<(), ContractError> {
            self.listening.store(false, Ordering::SeqCst);
            if self.fail_stop {
                return Err(ContractError::source("test", "usb stall"));
            }
            Ok(())
        }

        fn is_listening(&self) -> bool {
            self.listening.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<CaptureEvent>>,
    }

    impl RecordingSink {
        fn motion_timestamps(&self) -> Vec<f64> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    CaptureEvent::Motion(m) => Some(m.timestamp),
                    CaptureEvent::Observation(_) => None,
                })
                .collect()
        }
    }

    impl EventSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        fn emit(&self, event: CaptureEvent) -> Result<(), ContractError> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn image(kind: StreamKind, timestamp: f64) -> SensorPacket {
        SensorPacket::image(ImageFrame {
            stream_kind: kind,
            stream_index: 0,
            timestamp,
            width: 1,
            height: 1,
            format: PixelFormat::Z16,
            data: Bytes::from_static(&[0, 0]),
        })
    }

    fn config() -> CaptureConfig {
        CaptureConfig {
            mode: CaptureMode::RgbDepth,
            assembly: AssemblyConfig {
                initial_timeout_ms: 50,
                retry_timeout_ms: 10,
                deadline_s: 0.1,
                ..Default::default()
            },
            interpolation: InterpolationConfig {
                max_wait_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn orchestrator(
        config: CaptureConfig,
        host_now: f64,
    ) -> (CaptureOrchestrator, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let mut orchestrator = CaptureOrchestrator::new(
            config,
            Box::new(TestSource::default()),
            Arc::new(ManualClock::new(host_now)),
            sink.clone(),
        );
        orchestrator.start();
        (orchestrator, sink)
    }

    fn push_frameset(inputs: &SensorInputs, timestamp: f64) {
        inputs.push(image(StreamKind::Color, timestamp));
        inputs.push(image(StreamKind::Depth, timestamp + 1.0));
    }

    fn push_motion(inputs: &SensorInputs, timestamps: &[f64]) {
        for &t in timestamps {
            inputs.push(SensorPacket::motion(
                MotionKind::Gyro,
                t,
                Vector3::new(t, 0.0, 0.0),
            ));
            inputs.push(SensorPacket::motion(
                MotionKind::Accel,
                t,
                Vector3::new(0.0, 0.0, 9.8),
            ));
        }
    }

    #[test]
    fn test_capture_before_start() {
        let mut orchestrator = CaptureOrchestrator::new(
            config(),
            Box::new(TestSource::default()),
            Arc::new(ManualClock::new(0.0)),
            Arc::new(RecordingSink::default()),
        );
        assert_eq!(orchestrator.capture().unwrap_err(), CaptureError::NotStarted);
    }

    #[test]
    fn test_capture_interpolates_motion() {
        let (mut orchestrator, sink) = orchestrator(config(), 0.15);
        let inputs = orchestrator.inputs();
        push_motion(&inputs, &[100.0, 200.0]);
        push_frameset(&inputs, 150.0);

        let observation = orchestrator.capture().unwrap();
        assert_eq!(observation.sequence, 1);
        assert_eq!(observation.timestamp, 150.0);
        assert_eq!(observation.timestamp_s, 0.15);
        assert!(!observation.clock_corrected);
        let (gyro, accel) = observation.interpolated_motion.unwrap();
        assert_eq!(gyro.vector, Vector3::new(150.0, 0.0, 0.0));
        assert_eq!(accel.vector, Vector3::new(0.0, 0.0, 9.8));
        assert!(observation.interpolated_pose.is_none());
        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_interpolation_failure_degrades_observation() {
        let (mut orchestrator, _) = orchestrator(config(), 0.0);
        let inputs = orchestrator.inputs();
        push_motion(&inputs, &[500.0, 600.0]);
        push_frameset(&inputs, 150.0);

        let observation = orchestrator.capture().unwrap();
        assert!(observation.interpolated_motion.is_none());
        assert!(orchestrator.interpolator().too_old_warned());
    }

    #[test]
    fn test_missing_stream_times_out() {
        let (mut orchestrator, sink) = orchestrator(config(), 0.0);
        let inputs = orchestrator.inputs();
        inputs.push(image(StreamKind::Color, 10.0));

        let err = orchestrator.capture().unwrap_err();
        assert_eq!(
            err,
            CaptureError::Timeout {
                received: 1,
                required: 2
            }
        );
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_frames_dropped_when_queue_full() {
        let mut config = config();
        config.assembly.queue_capacity = 2;
        let (orchestrator, _) = orchestrator(config, 0.0);
        let inputs = orchestrator.inputs();
        for t in [10.0, 20.0, 30.0] {
            push_frameset(&inputs, t);
        }
        assert_eq!(orchestrator.frames_dropped(), 4);
    }

    #[test]
    fn test_clock_skew_uses_host_time() {
        let host_now = 1_700_000_000.0;
        let (mut orchestrator, _) = orchestrator(config(), host_now);
        let inputs = orchestrator.inputs();

        push_frameset(&inputs, 42.0);
        let first = orchestrator.capture().unwrap();
        assert!(first.clock_corrected);
        assert_eq!(first.timestamp_s, host_now);
        assert!(orchestrator.skew_guard().warned());

        push_frameset(&inputs, 80.0);
        orchestrator.capture().unwrap();
        assert_eq!(orchestrator.skew_guard().corrections(), 2);
    }

    #[test]
    fn test_disconnect_propagates() {
        let (mut orchestrator, _) = orchestrator(config(), 0.0);
        orchestrator.inputs().notify_disconnected("unplugged");

        assert!(matches!(
            orchestrator.capture().unwrap_err(),
            CaptureError::Source(contracts::SourceError::Disconnected { .. })
        ));
    }

    #[test]
    fn test_pose_dropped_unless_odometry_provided() {
        let (orchestrator, _) = orchestrator(config(), 0.0);
        orchestrator.inputs().push(SensorPacket::pose(
            1.0,
            PoseSample {
                transform: Pose3D::identity(),
                confidence: 3,
            },
        ));
        assert!(orchestrator.pose_series().is_empty());
    }

    #[test]
    fn test_pose_and_odometry() {
        let mut config = config();
        config.odometry.provided = true;
        let (mut orchestrator, _) = orchestrator(config, 0.0);
        let inputs = orchestrator.inputs();
        for (t, x) in [(100.0, 0.0), (200.0, 2.0)] {
            inputs.push(SensorPacket::pose(
                t,
                PoseSample {
                    transform: Pose3D::translation(x, 0.0, 0.0),
                    confidence: 2,
                },
            ));
        }
        push_frameset(&inputs, 150.0);

        let observation = orchestrator.capture().unwrap();
        let pose = observation.interpolated_pose.unwrap();
        assert!((pose.transform.translation.vector.x - 1.0).abs() < 1e-12);
        let odometry = observation.odometry.unwrap();
        assert_eq!(odometry.confidence, 2);
        assert!((odometry.covariance[(0, 0)] - 1e-3).abs() < 1e-15);
        assert!((odometry.covariance[(5, 5)] - 1e-5).abs() < 1e-18);
    }

    #[test]
    fn test_odometry_base_frame_transform() {
        let local = Pose3D::from_parts(
            Translation3::new(0.0, 0.0, 0.5),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
        );
        let pose = PoseSample {
            transform: Pose3D::translation(1.0, 0.0, 0.0),
            confidence: 3,
        };

        let estimate = odometry_estimate(&local, &pose);
        let t = estimate.pose.translation.vector;
        assert!((t.x - 0.0).abs() < 1e-12);
        assert!((t.y - 1.0).abs() < 1e-12);
        assert!((estimate.covariance[(0, 0)] - 1e-4).abs() < 1e-18);
        assert!((estimate.covariance[(3, 3)] - 1e-6).abs() < 1e-20);
    }

    fn replay_config(policy: OutOfOrderPolicy) -> CaptureConfig {
        CaptureConfig {
            replay: ReplayConfig {
                inter_frame: true,
                out_of_order: policy,
            },
            ..config()
        }
    }

    #[test]
    fn test_inter_frame_replay_emits_samples_between_captures() {
        let (mut orchestrator, sink) = orchestrator(replay_config(OutOfOrderPolicy::Skip), 0.0);
        let inputs = orchestrator.inputs();
        push_motion(&inputs, &[90.0, 100.0, 110.0, 120.0, 130.0, 140.0]);

        push_frameset(&inputs, 100.0);
        let first = orchestrator.capture().unwrap();
        assert!(first.interpolated_motion.is_none());
        assert!(sink.motion_timestamps().is_empty());

        push_frameset(&inputs, 130.0);
        orchestrator.capture().unwrap();
        assert_eq!(sink.motion_timestamps(), vec![110.0, 120.0]);
    }

    #[test]
    fn test_replay_stops_at_first_failure() {
        let (mut orchestrator, sink) = orchestrator(replay_config(OutOfOrderPolicy::Skip), 0.0);
        let inputs = orchestrator.inputs();
        push_motion(&inputs, &[100.0, 110.0]);
        // Gyro runs ahead of accel
        for t in [120.0, 130.0] {
            inputs.push(SensorPacket::motion(MotionKind::Gyro, t, Vector3::zeros()));
        }

        push_frameset(&inputs, 100.0);
        orchestrator.capture().unwrap();
        push_frameset(&inputs, 140.0);
        orchestrator.capture().unwrap();

        assert_eq!(sink.motion_timestamps(), vec![110.0]);
    }

    #[test]
    fn test_out_of_order_policies() {
        for policy in [
            OutOfOrderPolicy::Skip,
            OutOfOrderPolicy::Resync,
            OutOfOrderPolicy::Reject,
        ] {
            let (mut orchestrator, sink) = orchestrator(replay_config(policy), 0.0);
            let inputs = orchestrator.inputs();
            push_motion(&inputs, &[40.0, 60.0, 80.0, 100.0, 120.0]);

            push_frameset(&inputs, 100.0);
            orchestrator.capture().unwrap();
            // The syncer drops frames older than those already taken
            orchestrator.assembler.source_mut().reset();
            push_frameset(&inputs, 50.0);
            let result = orchestrator.capture();

            match policy {
                OutOfOrderPolicy::Reject => assert_eq!(
                    result.unwrap_err(),
                    CaptureError::OutOfOrder {
                        previous: 100.0,
                        current: 50.0
                    }
                ),
                _ => assert!(result.is_ok()),
            }
            assert!(sink.motion_timestamps().is_empty());

            if policy != OutOfOrderPolicy::Reject {
                push_frameset(&inputs, 90.0);
                orchestrator.capture().unwrap();
                let expected: Vec<f64> = match policy {
                    OutOfOrderPolicy::Resync => vec![60.0, 80.0],
                    _ => vec![],
                };
                assert_eq!(sink.motion_timestamps(), expected);
            }
        }
    }

    #[test]
    fn test_shutdown_reports_failure() {
        let sink = Arc::new(RecordingSink::default());
        let mut orchestrator = CaptureOrchestrator::new(
            config(),
            Box::new(TestSource {
                fail_stop: true,
                ..Default::default()
            }),
            Arc::new(ManualClock::new(0.0)),
            sink,
        );
        orchestrator.start();

        let err = orchestrator.shutdown().unwrap_err();
        assert!(err.to_string().contains("usb stall"));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (mut orchestrator, _) = orchestrator(config(), 0.0);
        orchestrator.shutdown().unwrap();
        orchestrator.shutdown().unwrap();
        assert_eq!(orchestrator.capture().unwrap_err(), CaptureError::NotStarted);
    }
}
