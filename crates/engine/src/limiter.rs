//! Leading-edge rate gates for event dispatch.

use std::time::{Duration, Instant};

/// Leading-edge debounce: the first invocation fires immediately; further
/// invocations are dropped until `wait` has elapsed since the last fire.
#[derive(Debug, Clone)]
pub struct Debounce {
    wait: Duration,
    last_fire: Option<Instant>,
}

impl Debounce {
    #[inline]
    #[must_use]
    pub const fn new(wait: Duration) -> Self {
        Self {
            wait,
            last_fire: None,
        }
    }

    /// Whether this invocation may fire now.
    #[inline]
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        match self.last_fire {
            Some(last) if now.duration_since(last) < self.wait => false,
            _ => {
                self.last_fire = Some(now);
                true
            }
        }
    }
}

/// Windowed throttle: admits one call, then rejects everything until `limit`
/// elapses.
#[derive(Debug, Clone)]
pub struct Throttle {
    limit: Duration,
    open_at: Option<Instant>,
}

impl Throttle {
    #[inline]
    #[must_use]
    pub const fn new(limit: Duration) -> Self {
        Self {
            limit,
            open_at: None,
        }
    }

    #[inline]
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        if self.open_at.is_none_or(|open| now >= open) {
            self.open_at = Some(now + self.limit);
            true
        } else {
            false
        }
    }
}
