//! Leveled, namespaced diagnostics.
//!
//! Two namespaces: `htmlex` (system-wide) and `htmlex::element`, which only
//! emits for elements carrying the `debug` attribute. A process-wide kill
//! switch silences both. Nothing else depends on this output for correctness.

use std::sync::atomic::{AtomicBool, Ordering};

static SILENCED: AtomicBool = AtomicBool::new(false);

/// Toggle the global kill switch.
#[inline]
pub fn silence(on: bool) {
    SILENCED.store(on, Ordering::Relaxed);
}

/// Whether diagnostic output is currently allowed.
#[inline]
#[must_use]
pub fn enabled() -> bool {
    !SILENCED.load(Ordering::Relaxed)
}

/// Log under the system namespace.
#[macro_export]
macro_rules! syslog {
    ($level:expr, $($arg:tt)+) => {
        if $crate::diag::enabled() {
            log::log!(target: "htmlex", $level, $($arg)+);
        }
    };
}

/// Log under the element namespace; `$debug` is the binding's debug flag.
#[macro_export]
macro_rules! elemlog {
    ($debug:expr, $level:expr, $($arg:tt)+) => {
        if $debug && $crate::diag::enabled() {
            log::log!(target: "htmlex::element", $level, $($arg)+);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::{enabled, silence};

    #[test]
    fn kill_switch_round_trips() {
        assert!(enabled());
        silence(true);
        assert!(!enabled());
        silence(false);
        assert!(enabled());
    }
}
