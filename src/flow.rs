//! Pause/resume signalling between the buffers and the connection task.
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::task::{self, Task};


/// Shared read-side flow control of one connection
///
/// Holders (the body buffer above its watermark, the pipeline queue at
/// capacity) place a pause hold; the connection task stops reading from
/// the transport while any hold is in place and is woken up when the
/// last one is released.
#[derive(Clone)]
pub struct FlowControl {
    inner: Arc<Inner>,
}

struct Inner {
    holds: AtomicUsize,
    task: Mutex<Option<Task>>,
}

impl FlowControl {
    pub fn new() -> FlowControl {
        FlowControl {
            inner: Arc::new(Inner {
                holds: AtomicUsize::new(0),
                task: Mutex::new(None),
            }),
        }
    }
    /// Place one pause hold. The caller must pair it with `resume`.
    pub fn pause(&self) {
        self.inner.holds.fetch_add(1, Ordering::SeqCst);
    }
    /// Release one pause hold, waking the reader when it was the last.
    pub fn resume(&self) {
        if self.inner.holds.fetch_sub(1, Ordering::SeqCst) == 1 {
            if let Some(ref task) = *self.inner.task.lock().unwrap() {
                task.notify();
            }
        }
    }
    pub fn is_paused(&self) -> bool {
        self.inner.holds.load(Ordering::SeqCst) > 0
    }
    /// Remember the connection task. Called on every poll of the
    /// connection future.
    pub fn register(&self) {
        *self.inner.task.lock().unwrap() = Some(task::current());
    }
}

#[cfg(test)]
mod test {
    use super::FlowControl;

    #[test]
    fn holds_are_counted() {
        let flow = FlowControl::new();
        assert!(!flow.is_paused());
        flow.pause();
        flow.pause();
        assert!(flow.is_paused());
        flow.resume();
        assert!(flow.is_paused());
        flow.resume();
        assert!(!flow.is_paused());
    }
}
