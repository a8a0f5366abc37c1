//! Debounced "something changed" signal for downstream input routing.
//!
//! Window geometry and visibility can change many times per frame.  Rather
//! than recomputing hit regions on every mutation, callers mark the tracker
//! dirty and a single flush runs once the debounce window has passed:
//!
//! ```text
//! mark_dirty ─┐
//! mark_dirty ─┼─► one delayed task ──(window elapses)──► flush(reasons) if still dirty
//! mark_dirty ─┘
//! ```
//!
//! If the dirty flag was cleared in the meantime (someone already took a
//! fresh snapshot) the flush is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;
use wms_core::TaskQueue;

/// Why the window layout is dirty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirtyReason {
    SessionAdded,
    SessionRemoved,
    Geometry,
    Visibility,
    Property,
    State,
    Focus,
}

pub type FlushCallback = Arc<dyn Fn(&[DirtyReason]) + Send + Sync>;

struct TrackerInner {
    dirty: AtomicBool,
    task_posted: AtomicBool,
    reasons: Mutex<Vec<DirtyReason>>,
    on_flush: Mutex<Option<FlushCallback>>,
}

pub struct DirtyTracker {
    queue: Arc<dyn TaskQueue>,
    window: Duration,
    inner: Arc<TrackerInner>,
}

impl DirtyTracker {
    pub fn new(queue: Arc<dyn TaskQueue>, window: Duration) -> Self {
        Self {
            queue,
            window,
            inner: Arc::new(TrackerInner {
                dirty: AtomicBool::new(false),
                task_posted: AtomicBool::new(false),
                reasons: Mutex::new(Vec::new()),
                on_flush: Mutex::new(None),
            }),
        }
    }

    pub fn set_flush_callback(&self, callback: FlushCallback) {
        *self.inner.on_flush.lock() = Some(callback);
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::Acquire)
    }

    pub fn mark_dirty(&self, reason: DirtyReason) {
        {
            let mut reasons = self.inner.reasons.lock();
            if !reasons.contains(&reason) {
                reasons.push(reason);
            }
        }
        self.inner.dirty.store(true, Ordering::Release);
        if self.inner.task_posted.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        self.queue
            .post_delayed(Box::new(move || Self::flush(&inner)), self.window);
    }

    /// Drops the dirty flag and pending reasons without flushing.
    pub fn clear(&self) {
        self.inner.dirty.store(false, Ordering::Release);
        self.inner.reasons.lock().clear();
    }

    fn flush(inner: &TrackerInner) {
        inner.task_posted.store(false, Ordering::Release);
        if !inner.dirty.swap(false, Ordering::AcqRel) {
            trace!("dirty flush skipped: nothing changed");
            return;
        }
        let reasons = std::mem::take(&mut *inner.reasons.lock());
        let callback = inner.on_flush.lock().clone();
        if let Some(callback) = callback {
            callback(&reasons);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
