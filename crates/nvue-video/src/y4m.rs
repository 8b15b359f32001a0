//! Lossless YUV4MPEG2 writer for monochrome streams.
//!
//! Mono8 frames are written as `C mono`, Mono16 as `C mono16` (little endian).
//! The stream header is written with the first frame, so the colour space
//! follows the camera; an empty recording gets a Mono8 header at close.

use crate::{SinkError, VideoSink, VideoSinkFactory};
use nvue_camera::{Frame, PixelFormat};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub struct Y4mSink {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    fps: u32,
    width: u32,
    height: u32,
    format: Option<PixelFormat>,
    frames: u64,
}

impl std::fmt::Debug for Y4mSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Y4mSink")
            .field("path", &self.path)
            .field("size", &(self.width, self.height))
            .field("fps", &self.fps)
            .field("frames", &self.frames)
            .field("open", &self.writer.is_some())
            .finish()
    }
}

fn colorspace(format: PixelFormat) -> Result<&'static str, SinkError> {
    match format {
        PixelFormat::Mono8 => Ok("mono"),
        PixelFormat::Mono16 => Ok("mono16"),
        other => Err(SinkError::UnsupportedFormat(other)),
    }
}

impl Y4mSink {
    pub fn create(path: &Path, fps: u32, width: u32, height: u32) -> Result<Self, SinkError> {
        if fps == 0 || width == 0 || height == 0 {
            return Err(SinkError::Open {
                path: path.to_path_buf(),
                message: format!("invalid stream geometry {width}x{height} at {fps} fps"),
            });
        }
        let file = File::create(path).map_err(|e| SinkError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
            path: path.to_path_buf(),
            fps,
            width,
            height,
            format: None,
            frames: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn write_header(&mut self, format: PixelFormat) -> Result<(), SinkError> {
        let cs = colorspace(format)?;
        let header = format!(
            "YUV4MPEG2 W{} H{} F{}:1 Ip A1:1 C{}\n",
            self.width, self.height, self.fps, cs
        );
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        writer.write_all(header.as_bytes())?;
        self.format = Some(format);
        Ok(())
    }
}

impl VideoSink for Y4mSink {
    fn append(&mut self, frame: &Frame) -> Result<(), SinkError> {
        if self.writer.is_none() {
            return Err(SinkError::Closed);
        }
        match self.format {
            None => self.write_header(frame.pixel_format)?,
            Some(format) if format != frame.pixel_format => {
                return Err(SinkError::Write(format!(
                    "pixel format changed from {:?} to {:?}",
                    format, frame.pixel_format
                )));
            }
            Some(_) => {}
        }
        if frame.size() != (self.width, self.height) {
            return Err(SinkError::Write(format!(
                "frame is {}x{}, stream is {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        let expected = frame.pixel_format.frame_len(self.width, self.height);
        if frame.payload.len() != expected {
            return Err(SinkError::Write(format!(
                "payload is {} bytes, expected {}",
                frame.payload.len(),
                expected
            )));
        }

        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        writer.write_all(b"FRAME\n")?;
        writer.write_all(&frame.payload)?;
        self.frames += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if self.writer.is_none() {
            return Ok(());
        }
        if self.format.is_none() {
            self.write_header(PixelFormat::Mono8)?;
        }
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        log::debug!("y4m: closed {} after {} frames", self.path.display(), self.frames);
        Ok(())
    }
}

impl Drop for Y4mSink {
    fn drop(&mut self) {
        if self.writer.is_some() {
            if let Err(error) = self.close() {
                log::error!("y4m: failed to close {}: {}", self.path.display(), error);
            }
        }
    }
}

/// Opens a `Y4mSink` per recording.
#[derive(Debug, Default, Clone, Copy)]
pub struct Y4mSinkFactory;

impl VideoSinkFactory for Y4mSinkFactory {
    fn open(
        &self,
        path: &Path,
        fps: u32,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn VideoSink>, SinkError> {
        Ok(Box::new(Y4mSink::create(path, fps, width, height)?))
    }

    fn file_extension(&self) -> &'static str {
        "y4m"
    }
}
