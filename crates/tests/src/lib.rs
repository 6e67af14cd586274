//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 模拟 e2e 测试（MockDevice -> CaptureOrchestrator -> Dispatcher）
//! - 配置加载到运行组件的连通性

#[cfg(test)]
mod contract_tests {
    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_default_blueprint_is_valid() {
        let blueprint = contracts::CaptureBlueprint::default();
        assert!(config_loader::ConfigLoader::validate(&blueprint).is_ok());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        CaptureConfig, CaptureEvent, CaptureMode, FrameRole, SinkConfig, SinkType, SourceError,
        StreamKind, SystemClock,
    };
    use dispatcher::{create_dispatcher, ChannelSink, Dispatcher, DispatcherBuilder, SinkHandle};
    use ingestion::{MockDevice, MockDeviceConfig, ScriptedSource};
    use observability::CaptureMetricsAggregator;
    use sync_engine::{CaptureError, CaptureOrchestrator};
    use tokio::sync::mpsc;

    fn fast_config(mode: CaptureMode) -> CaptureConfig {
        let mut config = CaptureConfig {
            mode,
            ..CaptureConfig::default()
        };
        config.assembly.initial_timeout_ms = 500;
        config.assembly.retry_timeout_ms = 20;
        config.assembly.deadline_s = 0.3;
        config
    }

    fn channel_dispatcher() -> (Arc<Dispatcher>, mpsc::Receiver<CaptureEvent>) {
        let (sink, rx) = ChannelSink::new("collector", 1024);
        let dispatcher = DispatcherBuilder::new()
            .with_handle(SinkHandle::spawn(sink, 1024, true))
            .build()
            .unwrap();
        (Arc::new(dispatcher), rx)
    }

    /// Run `n` captures on a blocking thread and stop the device
    async fn run_captures(
        mut orchestrator: CaptureOrchestrator,
        n: usize,
    ) -> Vec<Result<contracts::CompositeObservation, CaptureError>> {
        tokio::task::spawn_blocking(move || {
            orchestrator.start();
            let results = (0..n).map(|_| orchestrator.capture()).collect();
            orchestrator.shutdown().unwrap();
            results
        })
        .await
        .unwrap()
    }

    async fn drain(
        dispatcher: &Dispatcher,
        rx: &mut mpsc::Receiver<CaptureEvent>,
    ) -> Vec<CaptureEvent> {
        dispatcher.shutdown().await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    /// End-to-end test: MockDevice -> CaptureOrchestrator -> Dispatcher
    ///
    /// 验证完整的数据流：
    /// 1. MockDevice 在回调线程推送图像与 IMU
    /// 2. CaptureOrchestrator 组帧并插值
    /// 3. Dispatcher 将观测分发到 sink
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_e2e_mock_pipeline() {
        let (dispatcher, mut rx) = channel_dispatcher();
        let device = MockDevice::new(MockDeviceConfig::for_mode(CaptureMode::RgbDepth));
        let orchestrator = CaptureOrchestrator::new(
            fast_config(CaptureMode::RgbDepth),
            Box::new(device),
            Arc::new(SystemClock),
            dispatcher.clone(),
        );

        let results = run_captures(orchestrator, 5).await;
        let observations: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();

        for (i, obs) in observations.iter().enumerate() {
            assert_eq!(obs.sequence, i as u64 + 1);
            assert!(!obs.clock_corrected);
            assert!(obs.frameset.get(FrameRole::Color).is_some());
            assert!(obs.frameset.get(FrameRole::Depth).is_some());
        }
        assert!(observations
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp));
        assert!(observations.iter().any(|o| o.interpolated_motion.is_some()));

        let mut aggregator = CaptureMetricsAggregator::new();
        for obs in &observations {
            aggregator.update(obs, 1.0);
        }
        let summary = aggregator.summary();
        assert_eq!(summary.total_captures, 5);
        assert_eq!(summary.interval.count, 4);
        assert!(summary.interval.min > 0.0);
        assert_eq!(summary.clock_corrected, 0);

        let events = drain(&dispatcher, &mut rx).await;
        let sequences: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                CaptureEvent::Observation(obs) => Some(obs.sequence),
                CaptureEvent::Motion(_) => None,
            })
            .collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
    }

    /// Missing depth stream: every capture times out within its budget
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_e2e_missing_stream_times_out() {
        let (dispatcher, mut rx) = channel_dispatcher();
        let device = MockDevice::new(
            MockDeviceConfig::for_mode(CaptureMode::RgbDepth).with_silent(StreamKind::Depth),
        );
        let frame_period = Duration::from_secs_f64(1.0 / device.config().frame_rate_hz);
        let mut config = fast_config(CaptureMode::RgbDepth);
        // the color stream keeps arriving, so the long first wait must not count
        config.assembly.initial_timeout_ms = 5000;
        let budget = Duration::from_secs_f64(config.assembly.deadline_s)
            + Duration::from_millis(config.assembly.retry_timeout_ms)
            + frame_period;
        let mut orchestrator = CaptureOrchestrator::new(
            config,
            Box::new(device),
            Arc::new(SystemClock),
            dispatcher.clone(),
        );

        let (result, elapsed) = tokio::task::spawn_blocking(move || {
            orchestrator.start();
            let started = Instant::now();
            let result = orchestrator.capture();
            let elapsed = started.elapsed();
            orchestrator.shutdown().unwrap();
            (result, elapsed)
        })
        .await
        .unwrap();

        assert!(matches!(
            result,
            Err(CaptureError::Timeout {
                received: 1,
                required: 2
            })
        ));
        assert!(
            elapsed < budget + Duration::from_millis(100),
            "capture took {elapsed:?}, budget {budget:?}"
        );

        assert!(drain(&dispatcher, &mut rx).await.is_empty());
    }

    /// Device clock decades ahead of the host: host time is substituted
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_e2e_clock_skew_corrected() {
        let (dispatcher, mut rx) = channel_dispatcher();
        let device = MockDevice::new(MockDeviceConfig {
            clock_offset: 3e9 * 1000.0,
            ..MockDeviceConfig::for_mode(CaptureMode::RgbDepth)
        });
        let orchestrator = CaptureOrchestrator::new(
            fast_config(CaptureMode::RgbDepth),
            Box::new(device),
            Arc::new(SystemClock),
            dispatcher.clone(),
        );

        let host_before = contracts::Clock::now(&SystemClock) * 1000.0;
        let results = run_captures(orchestrator, 2).await;
        let host_after = contracts::Clock::now(&SystemClock) * 1000.0;

        for result in results {
            let obs = result.unwrap();
            assert!(obs.clock_corrected);
            assert!(obs.timestamp >= host_before && obs.timestamp <= host_after);
            // Motion samples stay in device time and cannot bracket host time
            assert!(obs.interpolated_motion.is_none());
        }
        assert_eq!(drain(&dispatcher, &mut rx).await.len(), 2);
    }

    /// Inter-frame replay: motion events fall strictly between captures
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_e2e_inter_frame_replay() {
        let (dispatcher, mut rx) = channel_dispatcher();
        let device = MockDevice::new(MockDeviceConfig::for_mode(CaptureMode::StereoIr));
        let mut config = fast_config(CaptureMode::StereoIr);
        config.replay.inter_frame = true;
        let orchestrator = CaptureOrchestrator::new(
            config,
            Box::new(device),
            Arc::new(SystemClock),
            dispatcher.clone(),
        );

        let results = run_captures(orchestrator, 4).await;
        assert!(results.iter().all(|r| r.is_ok()));

        let events = drain(&dispatcher, &mut rx).await;
        let mut previous: Option<f64> = None;
        let mut pending_motion = Vec::new();
        let mut motion_total = 0;
        for event in events {
            match event {
                CaptureEvent::Motion(motion) => pending_motion.push(motion.timestamp),
                CaptureEvent::Observation(obs) => {
                    assert!(obs.interpolated_motion.is_none());
                    match previous {
                        None => assert!(pending_motion.is_empty()),
                        Some(prev) => {
                            assert!(pending_motion.windows(2).all(|w| w[0] < w[1]));
                            assert!(pending_motion
                                .iter()
                                .all(|&t| t > prev && t < obs.timestamp));
                        }
                    }
                    motion_total += pending_motion.len();
                    pending_motion.clear();
                    previous = Some(obs.timestamp);
                }
            }
        }
        assert!(motion_total > 0);
    }

    /// Configuration file drives both the engine and the sinks
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_e2e_from_config() {
        let toml = r#"
            [capture]
            mode = "fisheye"

            [capture.assembly]
            initial_timeout_ms = 500
            retry_timeout_ms = 20
            deadline_s = 0.3

            [capture.interpolation]
            max_wait_ms = 20

            [[sinks]]
            name = "log"
            sink_type = "log"
            queue_capacity = 16
            forward_motion = false
        "#;
        let blueprint = ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(blueprint.capture.mode, CaptureMode::Fisheye);

        let dispatcher = Arc::new(create_dispatcher(blueprint.sinks.clone()).unwrap());
        let device = MockDevice::new(MockDeviceConfig::for_mode(blueprint.capture.mode));
        let orchestrator = CaptureOrchestrator::new(
            blueprint.capture.clone(),
            Box::new(device),
            Arc::new(SystemClock),
            dispatcher.clone(),
        );

        let results = run_captures(orchestrator, 3).await;
        for result in &results {
            let obs = result.as_ref().unwrap();
            assert!(obs.frameset.get(FrameRole::Left).is_some());
            assert!(obs.frameset.get(FrameRole::Right).is_some());
        }

        dispatcher.shutdown().await;
        let metrics = dispatcher.metrics();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].1.written, 3);
    }

    /// Scripted disconnect reaches the capture caller without retries
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_e2e_scripted_disconnect() {
        let (dispatcher, mut rx) = channel_dispatcher();
        let source = ScriptedSource::new("scripted")
            .pause(Duration::from_millis(20))
            .disconnect("usb reset");
        let orchestrator = CaptureOrchestrator::new(
            fast_config(CaptureMode::RgbDepth),
            Box::new(source),
            Arc::new(SystemClock),
            dispatcher.clone(),
        );

        let results = run_captures(orchestrator, 1).await;
        assert!(matches!(
            &results[0],
            Err(CaptureError::Source(SourceError::Disconnected { reason })) if reason == "usb reset"
        ));
        assert!(drain(&dispatcher, &mut rx).await.is_empty());
    }

    #[test]
    fn test_sink_config_shape() {
        let sink = SinkConfig {
            name: "log".into(),
            sink_type: SinkType::Log,
            queue_capacity: 8,
            forward_motion: true,
        };
        let mut blueprint = contracts::CaptureBlueprint::default();
        blueprint.sinks.push(sink);
        let toml = ConfigLoader::to_toml(&blueprint).unwrap();
        let reloaded = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        assert_eq!(reloaded.sinks[0].queue_capacity, 8);
    }
}
