//! Frame consumers: video sinks for recording (FFmpeg FFV1 and plain Y4M),
//! display sinks for live view, and still-image export.

pub mod error;
pub mod ffmpeg;
pub mod sink;
pub mod snapshot;
pub mod y4m;

pub use error::SinkError;
pub use ffmpeg::{FfmpegSink, FfmpegSinkFactory};
pub use sink::{DisplaySink, VideoSink, VideoSinkFactory};
pub use snapshot::save_snapshot;
pub use y4m::{Y4mSink, Y4mSinkFactory};
