//! Acquisition and recording control for triggered cameras.
//!
//! An `AcquisitionController` owns one camera. While streaming, a background
//! acquisition loop pulls frames from the device and hands each one to two
//! consumers: a `FrameMailbox` holding only the newest frame for live display,
//! and, while a recording is active, a lossless recording queue drained in
//! order into a video sink.

pub mod acquisition;
pub mod config;
pub mod controller;
pub mod error;
pub mod handoff;
pub mod mailbox;
pub mod queue;
pub mod recording;

pub use acquisition::{LoopCounters, LoopStats};
pub use config::{ControllerConfig, RecordingRequest, RecordingTarget};
pub use controller::{AcquisitionController, AcquisitionState, StopReport};
pub use error::{ControllerError, SessionFault};
pub use handoff::FrameHandoff;
pub use mailbox::FrameMailbox;
pub use queue::{RecordingReceiver, RecordingSender, recording_queue};
pub use recording::{RecordingSession, RecordingSummary, drain_queue};
