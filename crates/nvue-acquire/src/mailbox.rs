use nvue_camera::Frame;
use nvue_video::DisplaySink;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

#[derive(Default)]
struct MailboxInner {
    slot: Mutex<Option<Arc<Frame>>>,
    published: AtomicU64,
    overwritten: AtomicU64,
}

/// Single-slot, last-write-wins frame store for live display.
///
/// `publish` replaces any frame nobody has taken yet; the replaced frame is
/// dropped. `try_take` never blocks. Clones share the same slot.
#[derive(Clone, Default)]
pub struct FrameMailbox {
    inner: Arc<MailboxInner>,
}

impl std::fmt::Debug for FrameMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameMailbox")
            .field("published", &self.published())
            .field("overwritten", &self.overwritten())
            .finish()
    }
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: Arc<Frame>) {
        let previous = {
            let mut slot = self.inner.slot.lock().unwrap_or_else(|e| e.into_inner());
            slot.replace(frame)
        };
        self.inner.published.fetch_add(1, Ordering::Relaxed);
        if previous.is_some() {
            self.inner.overwritten.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take the newest frame, if one was published since the last take.
    pub fn try_take(&self) -> Option<Arc<Frame>> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Present the newest frame, if any. Returns whether a frame was shown.
    pub fn present_latest(&self, sink: &mut dyn DisplaySink) -> bool {
        match self.try_take() {
            Some(frame) => {
                sink.present(&frame);
                true
            }
            None => false,
        }
    }

    /// Frames published over the mailbox's lifetime.
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Frames replaced before anyone took them.
    pub fn overwritten(&self) -> u64 {
        self.inner.overwritten.load(Ordering::Relaxed)
    }
}
