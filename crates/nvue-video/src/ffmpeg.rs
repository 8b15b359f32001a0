//! Lossless recording through an FFmpeg child process.
//!
//! Raw frames are piped to FFmpeg's stdin and encoded with FFV1 into a
//! Matroska file. The process is started with the first frame, since the
//! input pixel format follows the camera.

use crate::{SinkError, VideoSink, VideoSinkFactory};
use ffmpeg_sidecar::command::FfmpegCommand;
use nvue_camera::{Frame, PixelFormat};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Stdio};
use std::thread::JoinHandle;

/// FFmpeg rawvideo pixel format name for a camera pixel format.
pub fn raw_pix_fmt(format: PixelFormat) -> Result<&'static str, SinkError> {
    match format {
        PixelFormat::Mono8 => Ok("gray"),
        PixelFormat::Mono16 => Ok("gray16le"),
        PixelFormat::Rgb8 => Ok("rgb24"),
        PixelFormat::Bgr8 => Ok("bgr24"),
        other => Err(SinkError::UnsupportedFormat(other)),
    }
}

/// Command line arguments for encoding a raw stdin stream to `path`.
pub fn encoder_args(
    path: &Path,
    pix_fmt: &str,
    fps: u32,
    width: u32,
    height: u32,
) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        // input: raw frames from stdin
        "-f",
        "rawvideo",
        "-pix_fmt",
        pix_fmt,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.extend([
        "-s".to_string(),
        format!("{}x{}", width, height),
        "-r".to_string(),
        fps.to_string(),
        "-i".to_string(),
        "-".to_string(),
    ]);
    // output: FFV1 is lossless for every format above
    args.extend(
        ["-c:v", "ffv1", "-level", "3", "-y"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.push(path.to_string_lossy().to_string());
    args
}

struct Encoder {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_reader: Option<JoinHandle<()>>,
}

pub struct FfmpegSink {
    binary: Option<PathBuf>,
    path: PathBuf,
    fps: u32,
    width: u32,
    height: u32,
    format: Option<PixelFormat>,
    encoder: Option<Encoder>,
    frames: u64,
    closed: bool,
}

impl std::fmt::Debug for FfmpegSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegSink")
            .field("path", &self.path)
            .field("size", &(self.width, self.height))
            .field("fps", &self.fps)
            .field("frames", &self.frames)
            .field("running", &self.encoder.is_some())
            .finish()
    }
}

impl FfmpegSink {
    /// Prepare a recording at `path`. The path is created right away so an
    /// unwritable destination fails here rather than at the first frame.
    pub fn create(
        binary: Option<PathBuf>,
        path: &Path,
        fps: u32,
        width: u32,
        height: u32,
    ) -> Result<Self, SinkError> {
        if fps == 0 || width == 0 || height == 0 {
            return Err(SinkError::Open {
                path: path.to_path_buf(),
                message: format!("invalid stream geometry {width}x{height} at {fps} fps"),
            });
        }
        File::create(path).map_err(|e| SinkError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self {
            binary,
            path: path.to_path_buf(),
            fps,
            width,
            height,
            format: None,
            encoder: None,
            frames: 0,
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn start(&mut self, format: PixelFormat) -> Result<(), SinkError> {
        let pix_fmt = raw_pix_fmt(format)?;
        let mut command = match &self.binary {
            Some(binary) => FfmpegCommand::new_with_path(binary),
            None => FfmpegCommand::new(),
        };
        command.args(encoder_args(&self.path, pix_fmt, self.fps, self.width, self.height));

        let inner = command.as_inner_mut();
        inner.stdin(Stdio::piped());
        inner.stdout(Stdio::null());
        inner.stderr(Stdio::piped());
        let mut child = inner.spawn().map_err(|e| SinkError::Open {
            path: self.path.clone(),
            message: format!("failed to start ffmpeg: {e}"),
        })?;
        let stdin = child.stdin.take().ok_or_else(|| SinkError::Open {
            path: self.path.clone(),
            message: "ffmpeg stdin unavailable".to_string(),
        })?;

        let stderr_reader = child.stderr.take().map(|stderr| {
            std::thread::spawn(move || {
                use std::io::{BufRead, BufReader};
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    log::warn!("ffmpeg: {}", line);
                }
            })
        });

        log::debug!(
            "ffmpeg: encoding {} ({} {}x{} @ {} fps)",
            self.path.display(),
            pix_fmt,
            self.width,
            self.height,
            self.fps
        );
        self.format = Some(format);
        self.encoder = Some(Encoder {
            child,
            stdin: Some(stdin),
            stderr_reader,
        });
        Ok(())
    }
}

impl VideoSink for FfmpegSink {
    fn append(&mut self, frame: &Frame) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        if frame.size() != (self.width, self.height) {
            return Err(SinkError::Write(format!(
                "frame is {}x{}, stream is {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        match self.format {
            None => self.start(frame.pixel_format)?,
            Some(format) if format != frame.pixel_format => {
                return Err(SinkError::Write(format!(
                    "pixel format changed from {:?} to {:?}",
                    format, frame.pixel_format
                )));
            }
            Some(_) => {}
        }
        let expected = frame.pixel_format.frame_len(self.width, self.height);
        if frame.payload.len() != expected {
            return Err(SinkError::Write(format!(
                "payload is {} bytes, expected {}",
                frame.payload.len(),
                expected
            )));
        }

        let stdin = self
            .encoder
            .as_mut()
            .and_then(|encoder| encoder.stdin.as_mut())
            .ok_or(SinkError::Closed)?;
        stdin.write_all(&frame.payload)?;
        self.frames += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let Some(mut encoder) = self.encoder.take() else {
            log::debug!("ffmpeg: {} closed without frames", self.path.display());
            return Ok(());
        };

        // end of input
        drop(encoder.stdin.take());
        let status = encoder.child.wait()?;
        if let Some(reader) = encoder.stderr_reader.take() {
            let _ = reader.join();
        }
        if !status.success() {
            return Err(SinkError::Write(format!(
                "ffmpeg exited with {} for {}",
                status,
                self.path.display()
            )));
        }
        log::debug!("ffmpeg: closed {} after {} frames", self.path.display(), self.frames);
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(error) = self.close() {
                log::error!("ffmpeg: failed to close {}: {}", self.path.display(), error);
            }
        }
    }
}

/// Opens an `FfmpegSink` per recording. Uses the bundled FFmpeg next to the
/// executable when present, otherwise `ffmpeg` from `PATH`.
#[derive(Debug, Default, Clone)]
pub struct FfmpegSinkFactory {
    binary: Option<PathBuf>,
}

impl FfmpegSinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }
}

impl VideoSinkFactory for FfmpegSinkFactory {
    fn open(
        &self,
        path: &Path,
        fps: u32,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn VideoSink>, SinkError> {
        Ok(Box::new(FfmpegSink::create(
            self.binary.clone(),
            path,
            fps,
            width,
            height,
        )?))
    }

    fn file_extension(&self) -> &'static str {
        "mkv"
    }
}
