use std::time::{Duration, Instant};

use tracing::info;

pub const DEFAULT_STATUS_EVERY: Duration = Duration::from_millis(2000);

/// Phase status lines, throttled so a busy loop does not flood the log.
#[derive(Debug)]
pub struct StatusLimiter {
    tag: &'static str,
    every: Duration,
    last: Option<Instant>,
}

impl StatusLimiter {
    pub fn new(tag: &'static str, every: Duration) -> Self {
        Self {
            tag,
            every,
            last: None,
        }
    }

    /// Log `text` unless a status line went out less than `every` ago.
    /// Returns whether it was logged.
    pub fn maybe(&mut self, text: &str) -> bool {
        if self.last.is_some_and(|t| t.elapsed() < self.every) {
            return false;
        }
        self.now(text);
        true
    }

    /// Log unconditionally and restart the throttling window.
    pub fn now(&mut self, text: &str) {
        info!("[{}] {}", self.tag, text);
        self.last = Some(Instant::now());
    }
}
