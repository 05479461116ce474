//! Cooperative cancel and skip flags for one run

use std::sync::atomic::{AtomicBool, Ordering};

/// Flags set by the caller and polled by the running stages.
///
/// `cancel` ends the run with a cancelled outcome. `skip` ("move to next
/// task") ends only the current stage; the next stage starts with whatever
/// the skipped stage produced.
#[derive(Debug, Default)]
pub struct RunControl {
    cancel: AtomicBool,
    skip: AtomicBool,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn request_skip(&self) {
        self.skip.store(true, Ordering::SeqCst);
    }

    pub fn skip_requested(&self) -> bool {
        self.skip.load(Ordering::SeqCst)
    }

    pub fn clear_skip(&self) {
        self.skip.store(false, Ordering::SeqCst);
    }

    /// True if the current stage should stop at its next check-in point
    pub fn should_stop(&self) -> bool {
        self.is_cancelled() || self.skip_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let control = RunControl::new();
        assert!(!control.should_stop());
        control.request_skip();
        assert!(control.should_stop());
        assert!(!control.is_cancelled());
        control.clear_skip();
        assert!(!control.should_stop());
        control.cancel();
        assert!(control.should_stop() && control.is_cancelled());
    }
}
