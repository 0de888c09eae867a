use std::time::{Duration, Instant};

/// Quiet interval after which a visitor typing indicator reverts to `false`.
pub const DEFAULT_TYPING_QUIET_INTERVAL: Duration = Duration::from_millis(1_000);

/// Debounce for the visitor typing indicator.
///
/// Holds at most one pending deadline. Each method returns the indicator value
/// that must go on the wire, or `None` when the remote side already sees the
/// latest intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingDebounce {
    quiet_interval: Duration,
    deadline: Option<Instant>,
}

impl Default for TypingDebounce {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_QUIET_INTERVAL)
    }
}

impl TypingDebounce {
    pub fn new(quiet_interval: Duration) -> Self {
        Self {
            quiet_interval,
            deadline: None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_typing(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn update(&mut self, is_typing: bool, now: Instant) -> Option<bool> {
        if is_typing {
            let already_typing = self.deadline.replace(now + self.quiet_interval).is_some();
            (!already_typing).then_some(true)
        } else {
            self.deadline.take().map(|_| false)
        }
    }

    /// Fires the pending clear once its deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Option<bool> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(false)
            }
            _ => None,
        }
    }

    /// Drops the pending deadline without emitting anything.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}
