use crate::SinkError;
use nvue_camera::Frame;
use std::path::Path;

/// An open video file accepting frames in order.
pub trait VideoSink: Send {
    fn append(&mut self, frame: &Frame) -> Result<(), SinkError>;

    /// Flush and close. Further appends fail with `SinkError::Closed`.
    fn close(&mut self) -> Result<(), SinkError>;
}

/// Opens video sinks; one sink per recording.
pub trait VideoSinkFactory: Send + Sync {
    fn open(
        &self,
        path: &Path,
        fps: u32,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn VideoSink>, SinkError>;

    /// File extension (without dot) for generated recording names.
    fn file_extension(&self) -> &'static str;
}

/// Renders frames for an operator. Fire-and-forget: an implementation may
/// drop frames, and must not block for long.
pub trait DisplaySink {
    fn present(&mut self, frame: &Frame);
}
