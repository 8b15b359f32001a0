use crate::{FrameMailbox, RecordingSender, SessionFault};
use nvue_camera::Frame;
use std::sync::Arc;

/// Recording half of a handoff: the queue plus the size the recording declared.
struct RecordingPath {
    sender: RecordingSender,
    frame_size: (u32, u32),
}

/// Fans each captured frame out to the display mailbox and, while a recording
/// is active, to the recording queue. Both paths share one payload.
pub struct FrameHandoff {
    mailbox: FrameMailbox,
    recording: Option<RecordingPath>,
}

impl FrameHandoff {
    pub fn display_only(mailbox: FrameMailbox) -> Self {
        Self {
            mailbox,
            recording: None,
        }
    }

    pub fn with_recording(
        mailbox: FrameMailbox,
        sender: RecordingSender,
        frame_size: (u32, u32),
    ) -> Self {
        Self {
            mailbox,
            recording: Some(RecordingPath { sender, frame_size }),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Publish to display unconditionally, then push to recording.
    ///
    /// A frame whose size differs from the recording's declared size is
    /// rejected before it reaches the queue.
    pub fn publish(&self, frame: Frame) -> Result<(), SessionFault> {
        let frame = Arc::new(frame);
        self.mailbox.publish(Arc::clone(&frame));

        if let Some(recording) = &self.recording {
            if frame.size() != recording.frame_size {
                return Err(SessionFault::DimensionMismatch {
                    expected: recording.frame_size,
                    actual: frame.size(),
                });
            }
            recording.sender.push(frame)?;
        }
        Ok(())
    }
}
