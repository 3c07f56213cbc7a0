//! Debounced command broadcast scheduling.
//!
//! # Responsibility
//! - Coalesce rapid command registrations into one scheduled flush.
//!
//! # Invariants
//! - The flush deadline is set by the first mark in a window; later marks
//!   inside the window do not postpone it.
//! - The flush itself reads live state; this type only decides *when*.

use std::time::{Duration, Instant};

/// Coalescing window for command broadcasts.
pub const COMMAND_BROADCAST_WINDOW: Duration = Duration::from_millis(600);

/// Dirty flag plus scheduled flush deadline.
#[derive(Debug)]
pub struct CommandBroadcast {
    window: Duration,
    deadline: Option<Instant>,
}

impl CommandBroadcast {
    pub fn new() -> Self {
        Self::with_window(COMMAND_BROADCAST_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Records that some card's command set changed.
    pub fn mark(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.window);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consumes the deadline when it has passed.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Drops any scheduled flush (used when flushing unconditionally).
    pub fn clear(&mut self) {
        self.deadline = None;
    }
}

impl Default for CommandBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::CommandBroadcast;
    use std::time::{Duration, Instant};

    #[test]
    fn marks_within_window_coalesce_into_one_flush() {
        let mut broadcast = CommandBroadcast::with_window(Duration::from_millis(600));
        let start = Instant::now();

        for offset in [0u64, 100, 200, 300, 400] {
            broadcast.mark(start + Duration::from_millis(offset));
        }

        assert!(!broadcast.due(start + Duration::from_millis(599)));
        assert!(broadcast.due(start + Duration::from_millis(600)));
        // Consumed: nothing further fires until the next mark.
        assert!(!broadcast.due(start + Duration::from_secs(10)));
    }

    #[test]
    fn mark_after_flush_schedules_again() {
        let mut broadcast = CommandBroadcast::with_window(Duration::from_millis(600));
        let start = Instant::now();
        broadcast.mark(start);
        assert!(broadcast.due(start + Duration::from_millis(600)));

        broadcast.mark(start + Duration::from_secs(1));
        assert!(broadcast.is_pending());
        assert!(broadcast.due(start + Duration::from_secs(2)));
    }
}
