//! Field node: pairs with the server, pings it while told to work, reports
//! what it measured and follows retune orders.

use std::thread::sleep;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, error, info, warn};

use crate::config::{ClientConfig, Jitter};
use crate::exchange::{self, ExchangeError};
use crate::link::{Radio, retune};
use crate::proto::message::{Address, Message};
use crate::scenario::TuningParams;
use crate::stats::Stats;
use crate::status::StatusLimiter;
use crate::timer::PhaseTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Pairing,
    Waiting,
    Working,
    Reporting,
}

pub struct Client<R: Radio> {
    radio: R,
    cfg: ClientConfig,
    state: ClientState,
    stats: Stats,
    timer: PhaseTimer,
    epoch: Instant,
    rng: StdRng,
    status: StatusLimiter,
    report_attempts: u32,
}

impl<R: Radio> Client<R> {
    pub fn new(radio: R, cfg: ClientConfig) -> Self {
        let status = StatusLimiter::new("client", cfg.status_every);
        let mut client = Self {
            radio,
            cfg,
            state: ClientState::Pairing,
            stats: Stats::new(),
            timer: PhaseTimer::start(),
            epoch: Instant::now(),
            rng: StdRng::from_entropy(),
            status,
            report_attempts: 0,
        };
        info!("[client] started client {}", client.radio.address());
        client.start_pairing();
        client
    }

    /// Make jitter reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn address(&self) -> Address {
        self.radio.address()
    }

    /// One step of the state machine. Never blocks longer than the reply
    /// timeout plus the current backoff.
    pub fn tick(&mut self) {
        match self.state {
            ClientState::Pairing => self.on_pairing(),
            ClientState::Waiting => self.on_waiting(),
            ClientState::Working => self.on_working(),
            ClientState::Reporting => self.on_reporting(),
        }
    }

    pub fn run_while(&mut self, mut keep_going: impl FnMut(&Self) -> bool) {
        while keep_going(self) {
            self.tick();
        }
    }

    /* -------------------- transitions -------------------- */

    fn start_pairing(&mut self) {
        self.state = ClientState::Pairing;
        self.status.now("Pairing...");
    }

    fn start_waiting(&mut self) {
        self.state = ClientState::Waiting;
        self.status.now("Waiting...");
    }

    fn start_working(&mut self) {
        self.state = ClientState::Working;
        self.status.now("Working...");
        self.stats.reset();
        self.timer.restart();
    }

    fn start_reporting(&mut self) {
        self.state = ClientState::Reporting;
        self.report_attempts = 0;
        self.status.now("Reporting...");
    }

    /* -------------------- states -------------------- */

    fn on_pairing(&mut self) {
        match self.request(&Message::Hello) {
            Ok((Message::Welcome, from)) if from == self.cfg.server => {
                self.status.now("Paired.");
                self.start_waiting();
                return;
            }
            Ok((other, from)) => debug!("[client] expected WELCOME, got {:?} from {}", other.kind(), from),
            Err(e) => debug!("[client] HELLO failed: {}", e),
        }
        self.backoff(self.cfg.pairing_backoff);
        self.status.maybe("Pairing...");
    }

    fn on_waiting(&mut self) {
        match exchange::receive(&mut self.radio, self.cfg.poll) {
            Ok(Some((Message::Work, _))) => {
                // Let the broadcast reach the other clients before loading the link.
                self.backoff(self.cfg.work_start);
                // Nobody waits for a reply to WORK.
                self.start_working();
                return;
            }
            Ok(Some((other, from))) => debug!("[client] waiting, ignoring {:?} from {}", other.kind(), from),
            Ok(None) => {}
            Err(e) => debug!("[client] waiting: {}", e),
        }
        self.status.maybe("Waiting...");
    }

    fn on_working(&mut self) {
        self.stats.record_attempt();
        exchange::drain(&mut self.radio);

        let ping = Message::Ping {
            timestamp_ms: self.now_ms(),
        };
        match exchange::send(&mut self.radio, &ping, self.cfg.server) {
            Ok(()) => {
                self.stats.record_success();
                match exchange::receive(&mut self.radio, self.cfg.reply_timeout) {
                    Ok(Some((Message::Pong { timestamp_ms }, _))) => {
                        let now = self.now_ms();
                        let _pause = self.timer.pause();
                        let rtt = now.wrapping_sub(timestamp_ms);
                        self.stats.record_reply(rtt);
                        debug!("[client] PING {}ms", rtt);
                    }
                    Ok(Some((Message::Query, _))) => {
                        self.start_reporting();
                        return;
                    }
                    Ok(Some((Message::Tune(params), _))) => {
                        self.retune(&params);
                        self.start_pairing();
                        return;
                    }
                    Ok(Some((other, from))) => {
                        warn!("[client] unexpected {:?} from {} while working", other.kind(), from)
                    }
                    Ok(None) => debug!("[client] no reply to PING"),
                    Err(e) => debug!("[client] PING reply: {}", e),
                }
            }
            Err(e) => warn!("[client] sending PING failed: {}", e),
        }

        self.backoff(self.cfg.ping_gap);
        self.status.maybe("Working...");
    }

    fn on_reporting(&mut self) {
        self.report_attempts = self.report_attempts.saturating_add(1);
        let report = Message::Report(self.stats.to_report());
        match self.request(&report) {
            Ok((Message::Ok, from)) if from == self.cfg.server => {
                self.status.now("Report delivered.");
                let summary = self.stats.summary(self.timer.elapsed());
                {
                    let _pause = self.timer.pause();
                    summary.log();
                }
                self.start_waiting();
                return;
            }
            Ok((Message::Tune(params), _)) => {
                self.retune(&params);
                self.start_pairing();
                return;
            }
            Ok((other, from)) => warn!("[client] unexpected {:?} from {} while reporting", other.kind(), from),
            Err(e) => debug!("[client] REPORT failed: {}", e),
        }

        if let Some(limit) = self.cfg.report_attempt_limit
            && self.report_attempts >= limit
        {
            warn!("[client] no report acknowledgement after {} attempts, re-pairing", self.report_attempts);
            self.start_pairing();
            return;
        }
        self.backoff(self.cfg.report_backoff);
        self.status.maybe("Reporting...");
    }

    /* -------------------- helpers -------------------- */

    /// Send to the server and wait for its answer, dropping anything that
    /// arrived earlier so the reply matches this request.
    fn request(&mut self, msg: &Message) -> Result<(Message, Address), ExchangeError> {
        let stale = exchange::drain(&mut self.radio);
        if stale > 0 {
            debug!("[client] dropped {} stale message(s)", stale);
        }
        exchange::request(&mut self.radio, msg, self.cfg.server, self.cfg.reply_timeout)
    }

    fn retune(&mut self, params: &TuningParams) {
        info!("[client] ==== tuning to {} ====", params);
        if let Err(e) = retune(&mut self.radio, params) {
            error!("[client] retune failed: {}", e);
        }
    }

    fn backoff(&mut self, jitter: Jitter) {
        let d = jitter.sample(&mut self.rng);
        if !d.is_zero() {
            sleep(d);
        }
    }

    /// Milliseconds since start, wrapping like a hardware tick counter.
    fn now_ms(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }
}
