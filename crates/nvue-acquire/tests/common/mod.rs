#![allow(dead_code)]

use nvue_acquire::{AcquisitionController, ControllerConfig, LoopStats};
use nvue_camera::{Frame, SimulatedCamera, SimulatedFeed, SimulatedProbe, SimulatedSystem};
use nvue_video::{SinkError, VideoSink, VideoSinkFactory};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Everything done to the sinks of one `MockSinkFactory`.
#[derive(Debug, Default)]
pub struct SinkLog {
    pub opened: Vec<(PathBuf, u32, u32, u32)>,
    pub appended: Vec<u64>,
    pub closes: usize,
}

#[derive(Clone, Default)]
pub struct MockSinkFactory {
    log: Arc<Mutex<SinkLog>>,
    append_delay: Option<Duration>,
    fail_open: bool,
    fail_append_at: Option<u64>,
}

impl MockSinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_append_delay(mut self, delay: Duration) -> Self {
        self.append_delay = Some(delay);
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Fail the append of the frame with this sequence number.
    pub fn failing_append_at(mut self, sequence: u64) -> Self {
        self.fail_append_at = Some(sequence);
        self
    }

    pub fn opened(&self) -> Vec<(PathBuf, u32, u32, u32)> {
        self.log.lock().unwrap().opened.clone()
    }

    pub fn appended(&self) -> Vec<u64> {
        self.log.lock().unwrap().appended.clone()
    }

    pub fn closes(&self) -> usize {
        self.log.lock().unwrap().closes
    }
}

impl VideoSinkFactory for MockSinkFactory {
    fn open(
        &self,
        path: &Path,
        fps: u32,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn VideoSink>, SinkError> {
        if self.fail_open {
            return Err(SinkError::Open {
                path: path.to_path_buf(),
                message: "permission denied".to_string(),
            });
        }
        self.log
            .lock()
            .unwrap()
            .opened
            .push((path.to_path_buf(), fps, width, height));
        Ok(Box::new(MockSink {
            log: Arc::clone(&self.log),
            append_delay: self.append_delay,
            fail_append_at: self.fail_append_at,
            closed: false,
        }))
    }

    fn file_extension(&self) -> &'static str {
        "mock"
    }
}

struct MockSink {
    log: Arc<Mutex<SinkLog>>,
    append_delay: Option<Duration>,
    fail_append_at: Option<u64>,
    closed: bool,
}

impl VideoSink for MockSink {
    fn append(&mut self, frame: &Frame) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        if let Some(delay) = self.append_delay {
            std::thread::sleep(delay);
        }
        if self.fail_append_at == Some(frame.sequence) {
            return Err(SinkError::Write("disk full".to_string()));
        }
        self.log.lock().unwrap().appended.push(frame.sequence);
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if !self.closed {
            self.closed = true;
            self.log.lock().unwrap().closes += 1;
        }
        Ok(())
    }
}

pub struct Rig {
    pub controller: AcquisitionController,
    pub feed: SimulatedFeed,
    pub probe: SimulatedProbe,
    pub sinks: MockSinkFactory,
}

pub fn fast_config() -> ControllerConfig {
    ControllerConfig::default()
        .with_retrieve_timeout(Duration::from_millis(20))
        .with_join_timeout(Duration::from_secs(5))
}

pub fn rig() -> Rig {
    rig_with(SimulatedCamera::new("SimCam", "0001"), MockSinkFactory::new(), fast_config())
}

pub fn rig_with(camera: SimulatedCamera, sinks: MockSinkFactory, config: ControllerConfig) -> Rig {
    let feed = camera.feed();
    let probe = camera.probe();
    let controller = AcquisitionController::new(
        Arc::new(SimulatedSystem::new(vec![camera])),
        Arc::new(sinks.clone()),
        config,
    );
    Rig {
        controller,
        feed,
        probe,
        sinks,
    }
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

pub async fn wait_for_stats(
    controller: &AcquisitionController,
    condition: impl Fn(&LoopStats) -> bool,
) -> bool {
    wait_until(|| condition(&controller.stats())).await
}

/// Wait for a loop that ends on its own and reap it.
pub async fn reap(
    controller: &mut AcquisitionController,
) -> Result<Option<nvue_acquire::StopReport>, nvue_acquire::ControllerError> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        match controller.poll().await {
            Ok(None) => tokio::time::sleep(Duration::from_millis(5)).await,
            other => return other,
        }
    }
    controller.poll().await
}
