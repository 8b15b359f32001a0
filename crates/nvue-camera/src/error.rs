use std::fmt;

/// Device-level errors: enumeration, opening, streaming.
#[derive(Debug)]
pub enum CameraError {
    NoDevice,
    IndexOutOfRange { index: usize, count: usize },
    Device(String),
    Stream(String),
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::NoDevice => write!(f, "no camera detected"),
            CameraError::IndexOutOfRange { index, count } => {
                write!(f, "camera index {index} out of range ({count} detected)")
            }
            CameraError::Device(msg) => write!(f, "device error: {msg}"),
            CameraError::Stream(msg) => write!(f, "stream error: {msg}"),
        }
    }
}

impl std::error::Error for CameraError {}

impl From<std::io::Error> for CameraError {
    fn from(err: std::io::Error) -> Self {
        CameraError::Device(err.to_string())
    }
}

/// Trigger configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnsupportedMode(String),
    InvalidSource { mode: String, source: String },
    NodeWrite { node: &'static str, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnsupportedMode(mode) => write!(f, "unsupported trigger mode: {mode}"),
            ConfigError::InvalidSource { mode, source } => {
                write!(f, "trigger source {source} cannot be used in {mode} mode")
            }
            ConfigError::NodeWrite { node, message } => {
                write!(f, "failed to write node {node}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Outcome of a failed `CameraDevice::retrieve_next`.
///
/// `Timeout` is routine (the camera may be waiting for a trigger);
/// `Fault` means the device can no longer stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrieveError {
    Timeout,
    Fault(String),
}

impl fmt::Display for RetrieveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrieveError::Timeout => write!(f, "timed out waiting for a frame"),
            RetrieveError::Fault(msg) => write!(f, "device fault: {msg}"),
        }
    }
}

impl std::error::Error for RetrieveError {}

impl From<std::io::Error> for RetrieveError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => RetrieveError::Timeout,
            _ => RetrieveError::Fault(err.to_string()),
        }
    }
}
