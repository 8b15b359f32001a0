use nvue_base::format_file_stamp;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tuning for an `AcquisitionController`.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    retrieve_timeout: Duration,
    recording_queue_capacity: usize,
    recording_push_timeout: Duration,
    join_timeout: Duration,
    software_trigger_per_frame: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            retrieve_timeout: Duration::from_millis(1000),
            recording_queue_capacity: 8,
            recording_push_timeout: Duration::from_secs(2),
            join_timeout: Duration::from_secs(10),
            software_trigger_per_frame: true,
        }
    }
}

impl ControllerConfig {
    /// How long one device retrieval may block. Bounds how quickly the
    /// acquisition loop notices a stop request.
    pub fn with_retrieve_timeout(mut self, timeout: Duration) -> Self {
        self.retrieve_timeout = timeout;
        self
    }

    /// Frames the recording queue holds before the loop blocks.
    pub fn with_recording_queue_capacity(mut self, capacity: usize) -> Self {
        self.recording_queue_capacity = capacity.max(1);
        self
    }

    /// How long the loop may block on a full recording queue before the
    /// session is aborted.
    pub fn with_recording_push_timeout(mut self, timeout: Duration) -> Self {
        self.recording_push_timeout = timeout;
        self
    }

    /// How long `stop` waits for the acquisition loop to exit.
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Fire a software trigger before every retrieval in software mode.
    pub fn with_software_trigger_per_frame(mut self, enabled: bool) -> Self {
        self.software_trigger_per_frame = enabled;
        self
    }

    pub fn retrieve_timeout(&self) -> Duration {
        self.retrieve_timeout
    }

    pub fn recording_queue_capacity(&self) -> usize {
        self.recording_queue_capacity
    }

    pub fn recording_push_timeout(&self) -> Duration {
        self.recording_push_timeout
    }

    pub fn join_timeout(&self) -> Duration {
        self.join_timeout
    }

    pub fn software_trigger_per_frame(&self) -> bool {
        self.software_trigger_per_frame
    }
}

/// Where a recording goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordingTarget {
    /// Exactly this file.
    File(PathBuf),
    /// A new `video_YYYY-MM-DD_HH-MM-SS.<ext>` file in this directory.
    Directory(PathBuf),
}

impl RecordingTarget {
    pub fn resolve(&self, extension: &str) -> PathBuf {
        match self {
            RecordingTarget::File(path) => path.clone(),
            RecordingTarget::Directory(dir) => {
                dir.join(format!("video_{}.{}", format_file_stamp(), extension))
            }
        }
    }
}

/// A request to record while streaming.
#[derive(Clone, Debug)]
pub struct RecordingRequest {
    target: RecordingTarget,
    fps: u32,
    frame_size: Option<(u32, u32)>,
}

impl RecordingRequest {
    pub fn to_file(path: impl AsRef<Path>) -> Self {
        Self::new(RecordingTarget::File(path.as_ref().to_path_buf()))
    }

    pub fn in_directory(dir: impl AsRef<Path>) -> Self {
        Self::new(RecordingTarget::Directory(dir.as_ref().to_path_buf()))
    }

    fn new(target: RecordingTarget) -> Self {
        Self {
            target,
            fps: 20,
            frame_size: None,
        }
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Declare the frame size. Without it the device is probed at start.
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = Some((width, height));
        self
    }

    pub fn target(&self) -> &RecordingTarget {
        &self.target
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn frame_size(&self) -> Option<(u32, u32)> {
        self.frame_size
    }
}
