//! Recording sessions and the worker that drains the recording queue.

use crate::{RecordingReceiver, SessionFault};
use nvue_base::CancelToken;
use nvue_camera::Frame;
use nvue_video::{SinkError, VideoSink, VideoSinkFactory};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// What a finished recording produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub frames: u64,
    pub elapsed: Duration,
}

/// One open video file. Frames must match the declared size; the sink is
/// closed exactly once, by `end` or on drop.
pub struct RecordingSession {
    sink: Option<Box<dyn VideoSink>>,
    path: PathBuf,
    fps: u32,
    frame_size: (u32, u32),
    frames: u64,
    started: Instant,
    summary: Option<RecordingSummary>,
}

impl RecordingSession {
    pub fn begin(
        factory: &dyn VideoSinkFactory,
        path: &Path,
        fps: u32,
        width: u32,
        height: u32,
    ) -> Result<Self, SinkError> {
        let sink = factory.open(path, fps, width, height)?;
        log::info!(
            "recording: started {} ({}x{} @ {} fps)",
            path.display(),
            width,
            height,
            fps
        );
        Ok(Self {
            sink: Some(sink),
            path: path.to_path_buf(),
            fps,
            frame_size: (width, height),
            frames: 0,
            started: Instant::now(),
            summary: None,
        })
    }

    /// Append one frame.
    pub fn consume(&mut self, frame: &Frame) -> Result<(), SessionFault> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(SessionFault::Sink(SinkError::Closed));
        };
        if frame.size() != self.frame_size {
            return Err(SessionFault::DimensionMismatch {
                expected: self.frame_size,
                actual: frame.size(),
            });
        }
        sink.append(frame)?;
        self.frames += 1;
        Ok(())
    }

    /// Close the sink. Calling again returns the same summary.
    pub fn end(&mut self) -> Result<RecordingSummary, SinkError> {
        if let Some(summary) = &self.summary {
            return Ok(summary.clone());
        }
        if let Some(mut sink) = self.sink.take() {
            sink.close()?;
        }
        let summary = RecordingSummary {
            path: self.path.clone(),
            frames: self.frames,
            elapsed: self.started.elapsed(),
        };
        log::info!(
            "recording: finished {} ({} frames in {:.1} s)",
            summary.path.display(),
            summary.frames,
            summary.elapsed.as_secs_f64()
        );
        self.summary = Some(summary.clone());
        Ok(summary)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_active(&self) -> bool {
        self.sink.is_some()
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.is_active() {
            if let Err(error) = self.end() {
                log::warn!("recording: failed to close {}: {}", self.path.display(), error);
            }
        }
    }
}

/// Append queued frames until the producer hangs up, then end the session.
/// On a fault the session is cancelled through `cancel` so the producer
/// stops too, and the sink is still closed before returning.
pub fn drain_queue(
    mut session: RecordingSession,
    mut receiver: RecordingReceiver,
    cancel: CancelToken,
) -> (RecordingSession, Option<SessionFault>) {
    let mut fault = drain(&mut session, &mut receiver).err();
    // unblocks a producer waiting on a full queue
    drop(receiver);
    if let Some(fault) = &fault {
        log::error!("recording: {}", fault);
        cancel.cancel();
    }
    if let Err(error) = session.end() {
        log::error!("recording: failed to close {}: {}", session.path().display(), error);
        fault.get_or_insert(SessionFault::Sink(error));
    }
    (session, fault)
}

fn drain(session: &mut RecordingSession, receiver: &mut RecordingReceiver) -> Result<(), SessionFault> {
    while let Some(frame) = receiver.next()? {
        session.consume(&frame)?;
    }
    Ok(())
}
