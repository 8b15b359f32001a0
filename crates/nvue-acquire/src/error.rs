use crate::AcquisitionState;
use nvue_camera::{CameraError, ConfigError};
use nvue_video::SinkError;
use std::fmt;
use std::time::Duration;

/// Errors that end a streaming session. The device stays initialized and
/// streaming can be started again.
#[derive(Debug)]
pub enum SessionFault {
    DeviceFault(String),
    RecordingTimeout { sequence: u64, waited: Duration },
    RecordingClosed,
    DimensionMismatch { expected: (u32, u32), actual: (u32, u32) },
    SequenceGap { expected: u64, got: u64 },
    Sink(SinkError),
}

impl fmt::Display for SessionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionFault::DeviceFault(msg) => write!(f, "device fault: {msg}"),
            SessionFault::RecordingTimeout { sequence, waited } => write!(
                f,
                "recording queue full for {} ms at frame {sequence}",
                waited.as_millis()
            ),
            SessionFault::RecordingClosed => write!(f, "recording queue closed"),
            SessionFault::DimensionMismatch { expected, actual } => write!(
                f,
                "frame is {}x{}, recording expects {}x{}",
                actual.0, actual.1, expected.0, expected.1
            ),
            SessionFault::SequenceGap { expected, got } => {
                write!(f, "sequence gap: expected frame {expected}, got {got}")
            }
            SessionFault::Sink(err) => write!(f, "recording sink failed: {err}"),
        }
    }
}

impl std::error::Error for SessionFault {}

impl From<SinkError> for SessionFault {
    fn from(err: SinkError) -> Self {
        SessionFault::Sink(err)
    }
}

#[derive(Debug)]
pub enum ControllerError {
    InvalidTransition {
        state: AcquisitionState,
        operation: &'static str,
    },
    Init(CameraError),
    Device(CameraError),
    Config(ConfigError),
    Sink(SinkError),
    Session(SessionFault),
    Internal(String),
    Closed,
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::InvalidTransition { state, operation } => {
                write!(f, "cannot {operation} while {state:?}")
            }
            ControllerError::Init(err) => write!(f, "initialization failed: {err}"),
            ControllerError::Device(err) => write!(f, "{err}"),
            ControllerError::Config(err) => write!(f, "trigger configuration failed: {err}"),
            ControllerError::Sink(err) => write!(f, "cannot open recording: {err}"),
            ControllerError::Session(fault) => write!(f, "streaming session failed: {fault}"),
            ControllerError::Internal(msg) => write!(f, "internal error: {msg}"),
            ControllerError::Closed => write!(f, "controller is closed"),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::Config(err)
    }
}

impl From<SinkError> for ControllerError {
    fn from(err: SinkError) -> Self {
        ControllerError::Sink(err)
    }
}

impl From<SessionFault> for ControllerError {
    fn from(fault: SessionFault) -> Self {
        ControllerError::Session(fault)
    }
}
