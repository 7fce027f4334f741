//! Runtime configuration for the engine.
//!
//! Configuration can be loaded from environment variables or constructed
//! programmatically (tests do the latter).

use core::time::Duration;
use std::env;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Frame budget in milliseconds; the scheduler releases one frame of
    /// updates per budget window.
    pub frame_budget_ms: u64,
    /// Minimum accepted poll interval in milliseconds.
    pub poll_floor_ms: u64,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for EngineConfig {
    #[inline]
    fn default() -> Self {
        Self {
            frame_budget_ms: 16,
            poll_floor_ms: 100,
            user_agent: String::from(concat!("htmlex/", env!("CARGO_PKG_VERSION"))),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// - `HTMLEX_FRAME_BUDGET_MS`: frame budget in milliseconds (default: 16)
    /// - `HTMLEX_POLL_FLOOR_MS`: minimum poll interval (default: 100)
    /// - `HTMLEX_USER_AGENT`: User-Agent header (default: `htmlex/<version>`)
    #[inline]
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let frame_budget_ms = env::var("HTMLEX_FRAME_BUDGET_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(defaults.frame_budget_ms)
            .max(1);
        let poll_floor_ms = env::var("HTMLEX_POLL_FLOOR_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(defaults.poll_floor_ms);
        let user_agent = env::var("HTMLEX_USER_AGENT")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.user_agent);
        Self {
            frame_budget_ms,
            poll_floor_ms,
            user_agent,
        }
    }

    #[inline]
    #[must_use]
    pub const fn frame_budget(&self) -> Duration {
        Duration::from_millis(self.frame_budget_ms)
    }

    #[inline]
    #[must_use]
    pub const fn poll_floor(&self) -> Duration {
        Duration::from_millis(self.poll_floor_ms)
    }
}
