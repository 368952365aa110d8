//! Rate limiting for repeated log messages.
//!
//! Non-fatal degradations (overruns, dropped frames, broker outages) can repeat
//! every tick. `LogThrottle` lets one message per key through per interval and
//! counts the rest so the next emitted message can report them.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Window {
    last_emit: Instant,
    suppressed: u64,
}

/// Per-key log rate limiter.
#[derive(Debug)]
pub struct LogThrottle {
    interval: Duration,
    windows: HashMap<String, Window>,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            windows: HashMap::new(),
        }
    }

    /// Returns `Some(suppressed)` when a message for `key` may be logged now,
    /// where `suppressed` counts the messages swallowed since the last one.
    pub fn check(&mut self, key: &str) -> Option<u64> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&mut self, key: &str, now: Instant) -> Option<u64> {
        match self.windows.get_mut(key) {
            None => {
                self.windows.insert(
                    key.to_string(),
                    Window {
                        last_emit: now,
                        suppressed: 0,
                    },
                );
                Some(0)
            }
            Some(window) if now.duration_since(window.last_emit) >= self.interval => {
                let suppressed = window.suppressed;
                window.last_emit = now;
                window.suppressed = 0;
                Some(suppressed)
            }
            Some(window) => {
                window.suppressed += 1;
                None
            }
        }
    }
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
