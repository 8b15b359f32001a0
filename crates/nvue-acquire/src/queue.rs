//! Bounded, lossless, ordered frame queue for recording.

use crate::SessionFault;
use crossbeam_channel::{Receiver, RecvError, SendTimeoutError, Sender};
use nvue_camera::Frame;
use std::sync::Arc;
use std::time::Duration;

/// Create a recording queue holding up to `capacity` frames. A push that
/// cannot complete within `push_timeout` fails the session.
pub fn recording_queue(
    capacity: usize,
    push_timeout: Duration,
) -> (RecordingSender, RecordingReceiver) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
    (
        RecordingSender {
            sender,
            push_timeout,
        },
        RecordingReceiver {
            receiver,
            expected: 0,
        },
    )
}

/// Producer side, owned by the acquisition loop.
pub struct RecordingSender {
    sender: Sender<Arc<Frame>>,
    push_timeout: Duration,
}

impl RecordingSender {
    /// Enqueue a frame, blocking while the queue is full.
    pub fn push(&self, frame: Arc<Frame>) -> Result<(), SessionFault> {
        match self.sender.send_timeout(frame, self.push_timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(frame)) => Err(SessionFault::RecordingTimeout {
                sequence: frame.sequence,
                waited: self.push_timeout,
            }),
            Err(SendTimeoutError::Disconnected(_)) => Err(SessionFault::RecordingClosed),
        }
    }

    pub fn len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
}

/// Consumer side, drained by the recording worker.
///
/// Checks that sequence numbers start at 0 and advance by exactly one.
pub struct RecordingReceiver {
    receiver: Receiver<Arc<Frame>>,
    expected: u64,
}

impl RecordingReceiver {
    /// Block for the next frame. `Ok(None)` once the producer is gone and
    /// the queue is empty.
    pub fn next(&mut self) -> Result<Option<Arc<Frame>>, SessionFault> {
        match self.receiver.recv() {
            Ok(frame) => {
                if frame.sequence != self.expected {
                    return Err(SessionFault::SequenceGap {
                        expected: self.expected,
                        got: frame.sequence,
                    });
                }
                self.expected += 1;
                Ok(Some(frame))
            }
            Err(RecvError) => Ok(None),
        }
    }
}
