use std::time::Duration;

use tracing::{info, warn};

use crate::proto::message::Report;

/// Ping statistics a client collects during one Working phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    num_total: u32,
    num_success: u32,
    num_reply: u32,
    min_ping_ms: u32,
    max_ping_ms: u32,
    total_ping_ms: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            num_total: 0,
            num_success: 0,
            num_reply: 0,
            min_ping_ms: u32::MAX,
            max_ping_ms: 0,
            total_ping_ms: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn record_attempt(&mut self) {
        self.num_total = self.num_total.saturating_add(1);
    }

    /// Count an acknowledged send. Ignored if it would outnumber attempts.
    pub fn record_success(&mut self) {
        if self.num_success >= self.num_total {
            warn!("[stats] success without attempt ignored ({}/{})", self.num_success, self.num_total);
            return;
        }
        self.num_success += 1;
    }

    /// Count a matching reply and its round-trip time. Ignored if it would
    /// outnumber acknowledged sends.
    pub fn record_reply(&mut self, rtt_ms: u32) {
        if self.num_reply >= self.num_success {
            warn!("[stats] reply without success ignored ({}/{})", self.num_reply, self.num_success);
            return;
        }
        self.num_reply += 1;
        self.total_ping_ms += u64::from(rtt_ms);
        self.min_ping_ms = self.min_ping_ms.min(rtt_ms);
        self.max_ping_ms = self.max_ping_ms.max(rtt_ms);
    }

    pub fn num_total(&self) -> u32 {
        self.num_total
    }

    pub fn num_success(&self) -> u32 {
        self.num_success
    }

    pub fn num_reply(&self) -> u32 {
        self.num_reply
    }

    /// Mean round-trip in ms (truncating), or `None` before the first reply.
    pub fn average(&self) -> Option<u32> {
        if self.num_reply == 0 {
            return None;
        }
        Some((self.total_ping_ms / u64::from(self.num_reply)) as u32)
    }

    pub fn min(&self) -> Option<u32> {
        (self.num_reply > 0).then_some(self.min_ping_ms)
    }

    pub fn max(&self) -> Option<u32> {
        (self.num_reply > 0).then_some(self.max_ping_ms)
    }

    /// Wire form of the snapshot.
    ///
    /// Latencies saturate at `u16::MAX` (about 65 s, far beyond any receive
    /// timeout). With no replies the average and minimum are both `u16::MAX`
    /// and the maximum is 0.
    pub fn to_report(&self) -> Report {
        Report {
            num_total: self.num_total,
            num_success: self.num_success,
            num_reply: self.num_reply,
            avg_ping_ms: saturate(self.average().unwrap_or(u32::MAX)),
            min_ping_ms: saturate(self.min_ping_ms),
            max_ping_ms: saturate(self.max_ping_ms),
        }
    }

    pub fn summary(&self, elapsed: Duration) -> Summary {
        Summary {
            num_total: self.num_total,
            num_success: self.num_success,
            num_reply: self.num_reply,
            elapsed,
            avg_ping_ms: self.average(),
            min_ping_ms: self.min(),
            max_ping_ms: self.max(),
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

fn saturate(ms: u32) -> u16 {
    u16::try_from(ms).unwrap_or(u16::MAX)
}

/// Human-readable end-of-phase figures.
#[derive(Debug, Clone)]
pub struct Summary {
    pub num_total: u32,
    pub num_success: u32,
    pub num_reply: u32,
    pub elapsed: Duration,
    pub avg_ping_ms: Option<u32>,
    pub min_ping_ms: Option<u32>,
    pub max_ping_ms: Option<u32>,
}

impl Summary {
    /// Per-second rate of `n` over the measured (unpaused) time.
    pub fn rate(&self, n: u32) -> f64 {
        f64::from(n) / self.elapsed.as_secs_f64().max(1e-3)
    }

    pub fn log(&self) {
        info!(
            "[stats] total={} successes={} replies={} over {:.1}s => total/s={:.1} successes/s={:.1} replies/s={:.1}",
            self.num_total,
            self.num_success,
            self.num_reply,
            self.elapsed.as_secs_f64(),
            self.rate(self.num_total),
            self.rate(self.num_success),
            self.rate(self.num_reply),
        );
        info!(
            "[stats] ping avg={} min={} max={}",
            fmt_ms(self.avg_ping_ms),
            fmt_ms(self.min_ping_ms),
            fmt_ms(self.max_ping_ms),
        );
    }
}

fn fmt_ms(v: Option<u32>) -> String {
    match v {
        Some(ms) => format!("{ms}ms"),
        None => "n/a".into(),
    }
}
