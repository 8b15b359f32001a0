//! The acquisition loop: one background unit of work per streaming session.

use crate::{FrameHandoff, SessionFault};
use nvue_base::CancelToken;
use nvue_camera::{CameraDevice, DeviceBuffer, Frame, RetrieveError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Live counters of one streaming session, shared with the controller.
#[derive(Debug, Default)]
pub struct LoopCounters {
    frames: AtomicU64,
    incomplete: AtomicU64,
    timeouts: AtomicU64,
    retrieved: AtomicU64,
    released: AtomicU64,
}

impl LoopCounters {
    pub fn snapshot(&self) -> LoopStats {
        LoopStats {
            frames: self.frames.load(Ordering::Relaxed),
            incomplete: self.incomplete.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            retrieved: self.retrieved.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            display_overwrites: 0,
        }
    }
}

/// Counters of a streaming session at one point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Complete frames published.
    pub frames: u64,
    pub incomplete: u64,
    pub timeouts: u64,
    /// Buffers obtained from the device.
    pub retrieved: u64,
    /// Buffers handed back to the device.
    pub released: u64,
    /// Display frames replaced before the display took them.
    pub display_overwrites: u64,
}

pub(crate) struct LoopContext {
    pub retrieve_timeout: Duration,
    pub software_trigger: bool,
    pub cancel: CancelToken,
    pub handoff: FrameHandoff,
    pub counters: Arc<LoopCounters>,
}

pub(crate) struct LoopOutcome {
    pub device: Box<dyn CameraDevice>,
    pub fault: Option<SessionFault>,
}

/// Holds a retrieved buffer and releases it on every exit path.
struct Retrieved<'a> {
    device: &'a mut dyn CameraDevice,
    buffer: Option<DeviceBuffer>,
    counters: &'a LoopCounters,
}

impl Retrieved<'_> {
    /// Copy the buffer into a frame, or report why it is unusable.
    fn to_frame(&self, sequence: u64) -> Result<Frame, String> {
        match &self.buffer {
            Some(buffer) if buffer.is_complete() => Ok(Frame::from_buffer(buffer, sequence)),
            Some(buffer) => Err(buffer.status().unwrap_or("unknown status").to_owned()),
            None => Err("buffer already released".to_owned()),
        }
    }
}

impl Drop for Retrieved<'_> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.device.release(buffer);
            self.counters.released.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Pull frames from `device` until cancelled or a session fault occurs.
///
/// The device must already be streaming; streaming is ended before the
/// device is handed back.
pub(crate) fn run(mut device: Box<dyn CameraDevice>, ctx: LoopContext) -> LoopOutcome {
    let counters = Arc::clone(&ctx.counters);
    let mut sequence = 0u64;
    log::info!(
        "acquisition: loop started (recording: {})",
        ctx.handoff.is_recording()
    );

    let fault = loop {
        if ctx.cancel.is_cancelled() {
            break None;
        }

        if ctx.software_trigger {
            if let Err(error) = device.execute_software_trigger() {
                log::error!("acquisition: software trigger failed: {}", error);
                break Some(SessionFault::DeviceFault(error.to_string()));
            }
        }

        let buffer = match device.retrieve_next(ctx.retrieve_timeout) {
            Ok(buffer) => buffer,
            Err(RetrieveError::Timeout) => {
                counters.timeouts.fetch_add(1, Ordering::Relaxed);
                log::debug!("acquisition: no frame within {:?}", ctx.retrieve_timeout);
                continue;
            }
            Err(RetrieveError::Fault(message)) => {
                log::error!("acquisition: device fault: {}", message);
                break Some(SessionFault::DeviceFault(message));
            }
        };
        counters.retrieved.fetch_add(1, Ordering::Relaxed);

        let retrieved = Retrieved {
            device: device.as_mut(),
            buffer: Some(buffer),
            counters: &counters,
        };
        let frame = retrieved.to_frame(sequence);
        drop(retrieved);
        let frame = match frame {
            Ok(frame) => frame,
            Err(status) => {
                counters.incomplete.fetch_add(1, Ordering::Relaxed);
                log::warn!("acquisition: incomplete image ({})", status);
                continue;
            }
        };

        sequence += 1;
        counters.frames.fetch_add(1, Ordering::Relaxed);
        if let Err(fault) = ctx.handoff.publish(frame) {
            log::error!("acquisition: {}", fault);
            break Some(fault);
        }
    };

    if let Err(error) = device.end_stream() {
        log::warn!("acquisition: failed to end stream: {}", error);
    }
    log::info!("acquisition: loop exited after {} frames", sequence);
    LoopOutcome { device, fault }
}
