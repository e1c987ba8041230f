//! When a queued batch becomes eligible for submission.

use std::time::Duration;

/// How the size threshold and idle window combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Flush only when the queue is both large enough and has stopped
    /// growing: count >= threshold AND idle >= window. A fast-arriving burst
    /// is given the idle window to fully collect before being cut off, so a
    /// queue that keeps growing is never flushed early. Callers wanting
    /// immediate-on-size behavior must stop enqueueing (or use
    /// [`SizeOrIdle`](Self::SizeOrIdle)).
    #[default]
    SizeAndIdle,
    /// Conventional batcher policy: flush a non-empty queue when either the
    /// size threshold is met or the idle window has elapsed.
    SizeOrIdle,
}

/// Tunables evaluated by the scheduler on every tick.
#[derive(Debug, Clone, Copy)]
pub struct FlushPolicy {
    /// Minimum total queued count to consider flushing.
    pub size_threshold: usize,
    /// Minimum elapsed time since the last enqueue before a flush is allowed.
    pub idle_window: Duration,
    pub mode: FlushMode,
}

impl FlushPolicy {
    pub const fn new(size_threshold: usize, idle_window: Duration) -> Self {
        Self {
            size_threshold,
            idle_window,
            mode: FlushMode::SizeAndIdle,
        }
    }

    pub const fn with_mode(mut self, mode: FlushMode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether a scheduled tick may flush. `idle_for` is `None` before the
    /// first enqueue.
    pub fn should_flush(&self, pending: usize, idle_for: Option<Duration>) -> bool {
        if pending == 0 {
            return false;
        }
        let size_met = pending >= self.size_threshold;
        let idle_met = idle_for.is_some_and(|idle| idle >= self.idle_window);

        match self.mode {
            FlushMode::SizeAndIdle => size_met && idle_met,
            FlushMode::SizeOrIdle => size_met || idle_met,
        }
    }

    /// Whether a manual flush may proceed: the idle window is bypassed, the
    /// size threshold is not.
    pub const fn should_flush_now(&self, pending: usize) -> bool {
        pending > 0 && pending >= self.size_threshold
    }
}
