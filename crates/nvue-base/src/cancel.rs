use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// A shared, cooperative cancellation signal.
///
/// Handed to a worker at spawn time. The worker checks `is_cancelled()`
/// between units of work; any clone may call `cancel()`. Once cancelled a
/// token stays cancelled, so every streaming session gets a fresh one.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
