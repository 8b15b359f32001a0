mod common;

use common::{MockSinkFactory, fast_config, reap, rig, rig_with, wait_for_stats, wait_until};
use nvue_acquire::{
    AcquisitionState, ControllerError, RecordingRequest, RecordingTarget, SessionFault,
};
use nvue_camera::{
    CameraError, ConfigError, NodeWrite, SimulatedCamera, SimulatedSystem, TriggerActivation,
    TriggerConfig, TriggerSource,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use AcquisitionState::*;

fn assert_valid_trace(history: &[AcquisitionState]) {
    assert_eq!(history.first(), Some(&Uninitialized));
    for pair in history.windows(2) {
        assert!(
            pair[0].can_transition_to(pair[1]),
            "invalid transition {:?} -> {:?} in {:?}",
            pair[0],
            pair[1],
            history
        );
    }
}

#[tokio::test]
async fn test_software_trigger_display_only() {
    let mut rig = rig();
    let descriptor = rig.controller.initialize(0).unwrap();
    assert_eq!(descriptor.model, "SimCam");
    assert_eq!(descriptor.serial, "0001");

    rig.controller
        .start(TriggerConfig::software(), None)
        .await
        .unwrap();
    assert_eq!(rig.controller.state(), Streaming);

    for _ in 0..5 {
        rig.feed.frame(32, 24);
    }
    rig.feed.incomplete(32, 24);
    assert!(wait_for_stats(&rig.controller, |s| s.frames == 5 && s.incomplete == 1).await);

    let report = rig.controller.stop().await.unwrap().unwrap();
    assert_eq!(rig.controller.state(), Initialized);
    assert_eq!(report.stats.frames, 5);
    assert_eq!(report.stats.incomplete, 1);
    assert_eq!(report.stats.display_overwrites, 4);
    assert!(report.recording.is_none());

    let last = rig.controller.mailbox().try_take().unwrap();
    assert_eq!(last.sequence, 4);
    assert!(rig.controller.mailbox().try_take().is_none());

    assert!(rig.probe.software_triggers() >= 6);
    assert_eq!(rig.probe.outstanding(), 0);
    assert!(!rig.probe.is_streaming());
    assert_eq!(
        rig.probe.node_writes(),
        vec![
            NodeWrite::ModeOff,
            NodeWrite::Source(TriggerSource::Software),
            NodeWrite::ModeOn,
        ]
    );
    assert_eq!(
        rig.controller.history(),
        &[Uninitialized, Initialized, Streaming, Draining, Initialized]
    );
}

#[tokio::test]
async fn test_hardware_trigger_recording() {
    let mut rig = rig();
    rig.controller.initialize(0).unwrap();

    let request = RecordingRequest::to_file("/tmp/capture.mock")
        .with_fps(20)
        .with_frame_size(640, 480);
    rig.controller
        .start(TriggerConfig::hardware(), Some(request))
        .await
        .unwrap();

    for _ in 0..3 {
        rig.feed.frame(640, 480);
    }
    assert!(wait_for_stats(&rig.controller, |s| s.frames == 3).await);

    let report = rig.controller.stop().await.unwrap().unwrap();
    let summary = report.recording.unwrap();
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.path, PathBuf::from("/tmp/capture.mock"));

    assert_eq!(
        rig.sinks.opened(),
        vec![(PathBuf::from("/tmp/capture.mock"), 20, 640, 480)]
    );
    assert_eq!(rig.sinks.appended(), vec![0, 1, 2]);
    assert_eq!(rig.sinks.closes(), 1);
    assert_eq!(rig.probe.software_triggers(), 0);
    assert_eq!(
        rig.probe.node_writes(),
        vec![
            NodeWrite::ModeOff,
            NodeWrite::Source(TriggerSource::Line2),
            NodeWrite::Activation(TriggerActivation::RisingEdge),
            NodeWrite::ModeOn,
        ]
    );
    assert_eq!(rig.controller.state(), Initialized);
}

#[tokio::test]
async fn test_dimension_mismatch_ends_session() {
    let mut rig = rig();
    rig.controller.initialize(0).unwrap();

    let request = RecordingRequest::to_file("/tmp/mismatch.mock").with_frame_size(640, 480);
    rig.controller
        .start(TriggerConfig::hardware(), Some(request))
        .await
        .unwrap();
    rig.feed.frame(640, 480);
    rig.feed.frame(320, 240);

    let result = reap(&mut rig.controller).await;
    assert!(matches!(
        result,
        Err(ControllerError::Session(SessionFault::DimensionMismatch {
            expected: (640, 480),
            actual: (320, 240),
        }))
    ));
    assert_eq!(rig.controller.state(), Initialized);
    assert_eq!(rig.sinks.appended(), vec![0]);
    assert_eq!(rig.sinks.closes(), 1);
    assert_eq!(rig.probe.outstanding(), 0);

    // the fault was surfaced once; stop is now a no-op
    assert!(rig.controller.stop().await.unwrap().is_none());
    assert_eq!(rig.sinks.closes(), 1);
}

#[tokio::test]
async fn test_fault_closes_recording_without_poll() {
    let mut rig = rig();
    rig.controller.initialize(0).unwrap();

    let request = RecordingRequest::to_file("/tmp/unpolled.mock").with_frame_size(640, 480);
    rig.controller
        .start(TriggerConfig::hardware(), Some(request))
        .await
        .unwrap();
    rig.feed.frame(640, 480);
    rig.feed.frame(320, 240);

    assert!(wait_until(|| rig.sinks.closes() == 1).await);
    assert!(wait_until(|| rig.controller.state() == Initialized).await);
    assert!(!rig.probe.is_streaming());
    assert_eq!(rig.probe.outstanding(), 0);

    let result = rig.controller.stop().await;
    assert!(matches!(
        result,
        Err(ControllerError::Session(SessionFault::DimensionMismatch { .. }))
    ));
    assert_eq!(rig.sinks.closes(), 1);
    assert_eq!(rig.controller.history().last(), Some(&Initialized));
}

#[tokio::test]
async fn test_stuck_worker_still_closes_camera() {
    let config = fast_config()
        .with_retrieve_timeout(Duration::from_millis(1500))
        .with_join_timeout(Duration::from_millis(100));
    let mut rig = rig_with(
        SimulatedCamera::new("SimCam", "0001"),
        MockSinkFactory::new(),
        config,
    );
    rig.controller.initialize(0).unwrap();

    let request = RecordingRequest::to_file("/tmp/stuck.mock").with_frame_size(8, 8);
    rig.controller
        .start(TriggerConfig::hardware(), Some(request))
        .await
        .unwrap();

    // the loop is parked in a retrieve longer than the join allows
    let result = rig.controller.stop().await;
    assert!(matches!(result, Err(ControllerError::Internal(_))));
    assert_eq!(rig.controller.state(), Closed);
    rig.controller.close().await.unwrap();

    assert!(wait_until(|| rig.probe.is_closed()).await);
    assert!(wait_until(|| rig.sinks.closes() == 1).await);
    assert_eq!(rig.probe.outstanding(), 0);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let mut rig = rig();
    rig.controller.initialize(0).unwrap();
    rig.controller
        .start(TriggerConfig::software(), None)
        .await
        .unwrap();

    for _ in 0..2 {
        let err = rig
            .controller
            .start(TriggerConfig::software(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ControllerError::InvalidTransition {
                state: Streaming,
                operation: "start"
            }
        ));
        assert_eq!(rig.controller.state(), Streaming);
    }
    assert_eq!(rig.probe.stream_begins(), 1);
    assert_eq!(rig.controller.history(), &[Uninitialized, Initialized, Streaming]);

    rig.controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_repeated_sessions_follow_state_machine() {
    let mut rig = rig();
    rig.controller.initialize(0).unwrap();

    for round in 0..3u64 {
        rig.controller
            .start(TriggerConfig::hardware(), None)
            .await
            .unwrap();
        rig.feed.frame(8, 8);
        assert!(wait_for_stats(&rig.controller, |s| s.frames == 1).await);
        let report = rig.controller.stop().await.unwrap().unwrap();
        assert_eq!(report.stats.frames, 1, "round {round}");
        // sequence numbers restart per session
        assert_eq!(rig.controller.mailbox().try_take().unwrap().sequence, 0);
    }
    assert!(rig.controller.stop().await.unwrap().is_none());
    rig.controller.close().await.unwrap();

    let history = rig.controller.history();
    assert_valid_trace(history);
    assert_eq!(history.len(), 1 + 1 + 3 * 3 + 1);
    assert_eq!(history.last(), Some(&Closed));
    assert_eq!(rig.probe.stream_begins(), 3);
    assert_eq!(rig.probe.stream_ends(), 3);
}

#[tokio::test]
async fn test_stop_then_close_releases_everything() {
    let mut rig = rig();
    rig.controller.initialize(0).unwrap();
    rig.controller
        .start(TriggerConfig::hardware(), None)
        .await
        .unwrap();
    for _ in 0..10 {
        rig.feed.frame(16, 16);
        rig.feed.incomplete(16, 16);
        rig.feed.timeout();
    }
    assert!(wait_for_stats(&rig.controller, |s| s.frames == 10 && s.incomplete == 10).await);

    rig.controller.stop().await.unwrap();
    rig.controller.close().await.unwrap();

    assert_eq!(rig.controller.state(), Closed);
    assert!(rig.probe.is_closed());
    assert_eq!(rig.probe.outstanding(), 0);
    assert_eq!(rig.probe.retrieved(), rig.probe.released());
    let stats = rig.controller.stats();
    assert_eq!(stats.retrieved, 20);
    assert_eq!(stats.released, 20);
    assert!(stats.timeouts >= 10);

    // idempotent
    rig.controller.close().await.unwrap();
    assert_eq!(rig.controller.history().last(), Some(&Closed));
    assert_eq!(
        rig.controller.history().iter().filter(|s| **s == Closed).count(),
        1
    );
}

#[tokio::test]
async fn test_close_while_streaming_finishes_recording() {
    let mut rig = rig();
    rig.controller.initialize(0).unwrap();
    let request = RecordingRequest::to_file("/tmp/close.mock").with_frame_size(4, 4);
    rig.controller
        .start(TriggerConfig::hardware(), Some(request))
        .await
        .unwrap();
    rig.feed.frame(4, 4);
    rig.feed.frame(4, 4);
    assert!(wait_for_stats(&rig.controller, |s| s.frames == 2).await);

    rig.controller.close().await.unwrap();
    assert_eq!(rig.sinks.appended(), vec![0, 1]);
    assert_eq!(rig.sinks.closes(), 1);
    assert!(rig.probe.is_closed());
    assert_eq!(
        rig.controller.history(),
        &[Uninitialized, Initialized, Streaming, Draining, Initialized, Closed]
    );
}

#[tokio::test]
async fn test_operations_after_close() {
    let mut rig = rig();
    rig.controller.close().await.unwrap();
    assert_eq!(rig.controller.history(), &[Uninitialized, Closed]);

    assert!(matches!(rig.controller.initialize(0), Err(ControllerError::Closed)));
    assert!(matches!(
        rig.controller.start(TriggerConfig::software(), None).await,
        Err(ControllerError::Closed)
    ));
    assert!(rig.controller.stop().await.unwrap().is_none());
    assert!(!rig.probe.is_closed());
}

#[tokio::test]
async fn test_initialize_errors() {
    let mut empty = nvue_acquire::AcquisitionController::new(
        Arc::new(SimulatedSystem::empty()),
        Arc::new(MockSinkFactory::new()),
        fast_config(),
    );
    assert!(matches!(
        empty.initialize(0),
        Err(ControllerError::Init(CameraError::NoDevice))
    ));
    assert_eq!(empty.state(), Uninitialized);

    let mut rig = rig();
    assert!(matches!(
        rig.controller.initialize(3),
        Err(ControllerError::Init(CameraError::IndexOutOfRange { index: 3, count: 1 }))
    ));
    assert_eq!(rig.controller.state(), Uninitialized);
    assert_eq!(rig.controller.devices().len(), 1);

    rig.controller.initialize(0).unwrap();
    assert!(matches!(
        rig.controller.initialize(0),
        Err(ControllerError::InvalidTransition {
            state: Initialized,
            operation: "initialize"
        })
    ));
}

#[tokio::test]
async fn test_start_before_initialize() {
    let mut rig = rig();
    let err = rig
        .controller
        .start(TriggerConfig::software(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ControllerError::InvalidTransition {
            state: Uninitialized,
            ..
        }
    ));
    assert!(rig.controller.stop().await.unwrap().is_none());
    assert_eq!(rig.controller.history(), &[Uninitialized]);
}

#[tokio::test]
async fn test_off_mode_is_rejected_and_left_off() {
    let mut rig = rig();
    rig.controller.initialize(0).unwrap();
    let err = rig
        .controller
        .start(TriggerConfig::off(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Config(ConfigError::UnsupportedMode(_))
    ));
    assert_eq!(rig.controller.state(), Initialized);
    assert_eq!(rig.probe.node_writes(), vec![NodeWrite::ModeOff]);
    assert!(!rig.probe.is_streaming());
}

#[tokio::test]
async fn test_failed_trigger_write_leaves_initialized() {
    let mut rig = rig();
    rig.controller.initialize(0).unwrap();
    rig.probe.fail_writes_to("TriggerActivation");

    let err = rig
        .controller
        .start(TriggerConfig::hardware(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Config(ConfigError::NodeWrite { .. })
    ));
    assert_eq!(rig.controller.state(), Initialized);
    assert!(!rig.probe.is_streaming());
    assert_eq!(rig.probe.node_writes().last(), Some(&NodeWrite::ModeOff));
}

#[tokio::test]
async fn test_unwritable_recording_path() {
    let mut rig = rig_with(
        SimulatedCamera::new("SimCam", "0002"),
        MockSinkFactory::new().failing_open(),
        fast_config(),
    );
    rig.controller.initialize(0).unwrap();
    let request = RecordingRequest::to_file("/nonexistent/out.mock").with_frame_size(8, 8);
    let err = rig
        .controller
        .start(TriggerConfig::hardware(), Some(request))
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::Sink(_)));
    assert_eq!(rig.controller.state(), Initialized);
    assert!(!rig.probe.is_streaming());

    // still usable without recording
    rig.controller
        .start(TriggerConfig::hardware(), None)
        .await
        .unwrap();
    rig.controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_device_fault_then_restart() {
    let mut rig = rig();
    rig.controller.initialize(0).unwrap();
    rig.controller
        .start(TriggerConfig::hardware(), None)
        .await
        .unwrap();
    rig.feed.frame(8, 8);
    rig.feed.fault("cable unplugged");

    let result = reap(&mut rig.controller).await;
    assert!(matches!(
        result,
        Err(ControllerError::Session(SessionFault::DeviceFault(ref m))) if m == "cable unplugged"
    ));
    assert_eq!(rig.controller.state(), Initialized);
    assert_eq!(rig.probe.outstanding(), 0);

    // no re-initialize needed
    rig.controller
        .start(TriggerConfig::hardware(), None)
        .await
        .unwrap();
    rig.feed.frame(8, 8);
    assert!(wait_for_stats(&rig.controller, |s| s.frames == 1).await);
    let report = rig.controller.stop().await.unwrap().unwrap();
    assert_eq!(report.stats.frames, 1);
    assert_valid_trace(rig.controller.history());
}

#[tokio::test]
async fn test_pending_fault_is_reported_by_start() {
    let mut rig = rig();
    rig.controller.initialize(0).unwrap();
    rig.controller
        .start(TriggerConfig::hardware(), None)
        .await
        .unwrap();
    rig.feed.fault("bus reset");
    assert!(common::wait_until(|| !rig.probe.is_streaming()).await);
    // give the worker a moment to hand the device back
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = rig
        .controller
        .start(TriggerConfig::hardware(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Session(SessionFault::DeviceFault(_))
    ));
    assert_eq!(rig.controller.state(), Initialized);

    rig.controller
        .start(TriggerConfig::hardware(), None)
        .await
        .unwrap();
    rig.controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_recording_queue_timeout() {
    let config = fast_config()
        .with_recording_queue_capacity(1)
        .with_recording_push_timeout(Duration::from_millis(20));
    let mut rig = rig_with(
        SimulatedCamera::new("SimCam", "0003"),
        MockSinkFactory::new().with_append_delay(Duration::from_millis(200)),
        config,
    );
    rig.controller.initialize(0).unwrap();
    let request = RecordingRequest::to_file("/tmp/slow.mock").with_frame_size(8, 8);
    rig.controller
        .start(TriggerConfig::hardware(), Some(request))
        .await
        .unwrap();
    for _ in 0..10 {
        rig.feed.frame(8, 8);
    }

    let result = reap(&mut rig.controller).await;
    assert!(matches!(
        result,
        Err(ControllerError::Session(SessionFault::RecordingTimeout { .. }))
    ));
    assert_eq!(rig.controller.state(), Initialized);
    assert_eq!(rig.sinks.closes(), 1);
    // whatever reached the queue was written, in order
    let appended = rig.sinks.appended();
    assert!(!appended.is_empty());
    assert!(appended.iter().copied().eq(0..appended.len() as u64));
}

#[tokio::test]
async fn test_sink_failure_stops_acquisition() {
    let mut rig = rig_with(
        SimulatedCamera::new("SimCam", "0004"),
        MockSinkFactory::new().failing_append_at(1),
        fast_config(),
    );
    rig.controller.initialize(0).unwrap();
    let request = RecordingRequest::to_file("/tmp/fail.mock").with_frame_size(8, 8);
    rig.controller
        .start(TriggerConfig::hardware(), Some(request))
        .await
        .unwrap();
    for _ in 0..3 {
        rig.feed.frame(8, 8);
    }

    let result = reap(&mut rig.controller).await;
    assert!(matches!(
        result,
        Err(ControllerError::Session(SessionFault::Sink(_)))
    ));
    assert_eq!(rig.sinks.appended(), vec![0]);
    assert_eq!(rig.sinks.closes(), 1);
    assert_eq!(rig.controller.state(), Initialized);
    assert_eq!(rig.probe.outstanding(), 0);
}

#[tokio::test]
async fn test_probe_frame_size() {
    let camera = SimulatedCamera::new("SimCam", "0005").with_software_response(64, 48);
    let mut rig = rig_with(camera, MockSinkFactory::new(), fast_config());

    assert!(matches!(
        rig.controller.probe_frame_size(),
        Err(ControllerError::InvalidTransition { .. })
    ));
    rig.controller.initialize(0).unwrap();
    assert_eq!(rig.controller.probe_frame_size().unwrap(), (64, 48));
    assert_eq!(rig.probe.outstanding(), 0);
    assert!(!rig.probe.is_streaming());
    assert_eq!(rig.probe.software_triggers(), 1);
}

#[tokio::test]
async fn test_probe_without_response_times_out() {
    let mut rig = rig();
    rig.controller.initialize(0).unwrap();
    assert!(matches!(
        rig.controller.probe_frame_size(),
        Err(ControllerError::Init(CameraError::Stream(_)))
    ));
    assert!(!rig.probe.is_streaming());
    assert_eq!(rig.controller.state(), Initialized);
}

#[tokio::test]
async fn test_recording_into_directory_probes_size() {
    let camera = SimulatedCamera::new("SimCam", "0006").with_software_response(64, 48);
    let mut rig = rig_with(camera, MockSinkFactory::new(), fast_config());
    rig.controller.initialize(0).unwrap();

    let dir = std::env::temp_dir();
    let request = RecordingRequest::in_directory(&dir);
    assert_eq!(request.target(), &RecordingTarget::Directory(dir.clone()));
    rig.controller
        .start(TriggerConfig::software(), Some(request))
        .await
        .unwrap();
    assert!(wait_for_stats(&rig.controller, |s| s.frames >= 3).await);
    let report = rig.controller.stop().await.unwrap().unwrap();

    let opened = rig.sinks.opened();
    assert_eq!(opened.len(), 1);
    let (path, fps, width, height) = &opened[0];
    assert_eq!((*fps, *width, *height), (20, 64, 48));
    assert_eq!(path.parent(), Some(dir.as_path()));
    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("video_") && name.ends_with(".mock"), "{name}");
    let stamp = &name["video_".len()..name.len() - ".mock".len()];
    let named_at = chrono::NaiveDateTime::parse_from_str(stamp, nvue_base::FILE_STAMP_FORMAT).unwrap();
    let drift = chrono::Local::now().naive_local() - named_at;
    assert!(drift.num_seconds().abs() < 60, "{stamp} is not local time");

    let summary = report.recording.unwrap();
    assert_eq!(summary.frames, rig.sinks.appended().len() as u64);
    assert_eq!(summary.frames, report.stats.frames);
}

#[tokio::test]
async fn test_stale_stream_is_ended_on_initialize() {
    let camera = SimulatedCamera::new("SimCam", "0007");
    let probe = camera.probe();
    let mut device: Box<dyn nvue_camera::CameraDevice> = Box::new(camera);
    device.begin_stream().unwrap();
    assert!(probe.is_streaming());

    struct Handover(std::sync::Mutex<Option<Box<dyn nvue_camera::CameraDevice>>>, nvue_camera::DeviceDescriptor);
    impl nvue_camera::CameraSystem for Handover {
        fn enumerate(&self) -> Vec<nvue_camera::DeviceDescriptor> {
            vec![self.1.clone()]
        }
        fn open(&self, _index: usize) -> Result<Box<dyn nvue_camera::CameraDevice>, CameraError> {
            self.0.lock().unwrap().take().ok_or(CameraError::NoDevice)
        }
    }
    let descriptor = device.descriptor().clone();
    let system = Handover(std::sync::Mutex::new(Some(device)), descriptor);

    let mut controller = nvue_acquire::AcquisitionController::new(
        Arc::new(system),
        Arc::new(MockSinkFactory::new()),
        fast_config(),
    );
    controller.initialize(0).unwrap();
    assert!(!probe.is_streaming());
    assert_eq!(probe.stream_ends(), 1);
    controller.close().await.unwrap();
}
