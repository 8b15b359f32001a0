use nvue_camera::PixelFormat;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum SinkError {
    Open { path: PathBuf, message: String },
    Write(String),
    UnsupportedFormat(PixelFormat),
    Closed,
    Io(std::io::Error),
    Encode(image::ImageError),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Open { path, message } => {
                write!(f, "cannot open {}: {message}", path.display())
            }
            SinkError::Write(msg) => write!(f, "write error: {msg}"),
            SinkError::UnsupportedFormat(format) => write!(f, "unsupported pixel format: {format:?}"),
            SinkError::Closed => write!(f, "sink is closed"),
            SinkError::Io(err) => write!(f, "io error: {err}"),
            SinkError::Encode(err) => write!(f, "encode error: {err}"),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err)
    }
}

impl From<image::ImageError> for SinkError {
    fn from(err: image::ImageError) -> Self {
        SinkError::Encode(err)
    }
}
