use std::time::Duration;

use rand::Rng;

use crate::proto::message::Address;
use crate::registry::DEFAULT_CAPACITY;
use crate::status::DEFAULT_STATUS_EVERY;

/// Address the coordinator listens on unless configured otherwise.
pub const DEFAULT_SERVER_ADDRESS: Address = 1;

/// Half-open random delay range `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    pub min: Duration,
    pub max: Duration,
}

impl Jitter {
    pub const fn millis(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rng.gen_range(self.min..self.max)
    }
}

/// When the server leaves the Reporting phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportingPolicy {
    /// Stay for the whole ceiling regardless of who has reported.
    #[default]
    Ceiling,
    /// Leave once every paired device has reported, or at the ceiling.
    AllReported,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: Address,
    pub pairing_period: Duration,
    pub work_period: Duration,
    pub reporting_ceiling: Duration,
    pub tuning_period: Duration,
    /// How long each phase-change broadcast is repeated.
    pub broadcast_for: Duration,
    pub broadcast_gap: Duration,
    /// Receive wait per tick.
    pub poll: Duration,
    pub reporting_policy: ReportingPolicy,
    pub registry_capacity: usize,
    pub status_every: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_SERVER_ADDRESS,
            pairing_period: Duration::from_secs(10),
            work_period: Duration::from_secs(10),
            reporting_ceiling: Duration::from_secs(30),
            tuning_period: Duration::from_secs(10),
            broadcast_for: Duration::from_millis(2000),
            broadcast_gap: Duration::from_millis(10),
            poll: Duration::from_millis(10),
            reporting_policy: ReportingPolicy::Ceiling,
            registry_capacity: DEFAULT_CAPACITY,
            status_every: DEFAULT_STATUS_EVERY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: Address,
    /// How long to wait for any reply to a request.
    pub reply_timeout: Duration,
    pub pairing_backoff: Jitter,
    /// Delay after WORK before pinging, so the broadcast reaches siblings.
    pub work_start: Jitter,
    pub ping_gap: Jitter,
    pub report_backoff: Jitter,
    /// Receive wait per tick while Waiting.
    pub poll: Duration,
    /// Give up reporting after this many attempts and re-pair. `None`
    /// retries forever.
    pub report_attempt_limit: Option<u32>,
    pub status_every: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER_ADDRESS,
            reply_timeout: Duration::from_millis(2000),
            pairing_backoff: Jitter::millis(50, 150),
            work_start: Jitter::millis(1000, 1500),
            ping_gap: Jitter::millis(10, 15),
            report_backoff: Jitter::millis(50, 150),
            poll: Duration::from_millis(100),
            report_attempt_limit: None,
            status_every: DEFAULT_STATUS_EVERY,
        }
    }
}
