//! Coordinator: pairs clients, times the work and report phases, collects
//! reports and walks the fleet through the scenario list.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::config::{ReportingPolicy, ServerConfig};
use crate::exchange;
use crate::link::{Radio, retune};
use crate::proto::message::{Address, Message};
use crate::registry::{Admission, Registry};
use crate::report::{ReportRecord, ReportSink};
use crate::scenario::Scenarios;
use crate::status::StatusLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Pairing,
    Working,
    Reporting,
    Tuning,
}

pub struct Server<R: Radio, S: ReportSink> {
    radio: R,
    sink: S,
    cfg: ServerConfig,
    registry: Registry,
    scenarios: Scenarios,
    state: ServerState,
    entered: Instant,
    reported: HashSet<Address>,
    status: StatusLimiter,
    cycles: u64,
}

impl<R: Radio, S: ReportSink> Server<R, S> {
    /// Tune the radio to the first scenario and start pairing.
    pub fn new(radio: R, sink: S, scenarios: Scenarios, cfg: ServerConfig) -> Self {
        let mut server = Self {
            radio,
            sink,
            registry: Registry::with_capacity(cfg.registry_capacity),
            status: StatusLimiter::new("server", cfg.status_every),
            cfg,
            scenarios,
            state: ServerState::Pairing,
            entered: Instant::now(),
            reported: HashSet::new(),
            cycles: 0,
        };
        info!("[server] started server {}", server.radio.address());
        server.apply_current_scenario();
        server.start_pairing();
        server
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn scenarios(&self) -> &Scenarios {
        &self.scenarios
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Completed Tuning phases since start.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn tick(&mut self) {
        match self.state {
            ServerState::Pairing => self.on_pairing(),
            ServerState::Working => self.on_working(),
            ServerState::Reporting => self.on_reporting(),
            ServerState::Tuning => self.on_tuning(),
        }
    }

    pub fn run_while(&mut self, mut keep_going: impl FnMut(&Self) -> bool) {
        while keep_going(self) {
            self.tick();
        }
    }

    /* -------------------- transitions -------------------- */

    fn start_pairing(&mut self) {
        self.registry.clear();
        self.enter(ServerState::Pairing, "Pairing...");
    }

    fn start_working(&mut self) {
        info!(
            "[server] asking paired devices to start working ({})",
            self.registry.len()
        );
        self.broadcast(Message::Work);
        self.enter(ServerState::Working, "Working...");
    }

    fn start_reporting(&mut self) {
        self.reported.clear();
        self.enter(ServerState::Reporting, "Reporting...");
    }

    fn start_tuning(&mut self) {
        self.enter(ServerState::Tuning, "Tuning...");
    }

    fn enter(&mut self, state: ServerState, text: &str) {
        self.state = state;
        self.entered = Instant::now();
        self.status.now(text);
    }

    /* -------------------- states -------------------- */

    fn on_pairing(&mut self) {
        if self.entered.elapsed() > self.cfg.pairing_period {
            self.start_working();
            return;
        }

        if let Some((msg, from)) = self.receive() {
            if let Message::Hello = msg {
                match exchange::send(&mut self.radio, &Message::Welcome, from) {
                    Ok(()) => match self.registry.add(from) {
                        Ok(Admission::Inserted) => info!("[server] a new device detected ({})", from),
                        Ok(Admission::AlreadyPresent) => debug!("[server] {} already paired", from),
                        Err(e) => error!("[server] cannot pair {}: {}", from, e),
                    },
                    Err(e) => warn!("[server] sending WELCOME to {} failed: {}", from, e),
                }
            } else {
                warn!("[server] expecting HELLO, got {:?} from {}", msg.kind(), from);
                self.reply(Message::Error, from);
            }
        }

        self.status.maybe("Pairing...");
    }

    fn on_working(&mut self) {
        if self.entered.elapsed() > self.cfg.work_period {
            self.start_reporting();
            return;
        }

        if let Some((msg, from)) = self.receive() {
            if let Message::Ping { timestamp_ms } = msg {
                self.count_ping(from);
                self.reply(Message::Pong { timestamp_ms }, from);
            } else {
                debug!("[server] expecting PING, got {:?} from {}", msg.kind(), from);
                self.reply(Message::Error, from);
            }
        }

        self.status.maybe("Working...");
    }

    fn on_reporting(&mut self) {
        if self.entered.elapsed() > self.cfg.reporting_ceiling || self.everyone_reported() {
            // Release clients still waiting for an OK.
            self.broadcast(Message::Work);
            self.start_tuning();
            return;
        }

        if let Some((msg, from)) = self.receive() {
            match msg {
                Message::Report(report) => {
                    if self.reported.insert(from) {
                        let record = ReportRecord {
                            params: self.scenarios.current(),
                            from,
                            report,
                            server_pings: self.registry.stats_for(from).map(|c| c.pings),
                        };
                        self.sink.emit(&record);
                    } else {
                        debug!("[server] duplicate report from {}", from);
                    }
                    self.reply(Message::Ok, from);
                }
                other => {
                    // Clients keep pinging until they hear QUERY; keep the
                    // server-side count in step with theirs.
                    if let Message::Ping { .. } = other {
                        self.count_ping(from);
                    }
                    self.reply(Message::Query, from);
                }
            }
        }

        self.status.maybe("Reporting...");
    }

    fn on_tuning(&mut self) {
        if self.entered.elapsed() > self.cfg.tuning_period {
            self.apply_current_scenario();
            self.scenarios.advance();
            self.cycles += 1;
            self.start_pairing();
            return;
        }

        // Only clients that talk to us learn the new configuration.
        if let Some((_, from)) = self.receive() {
            self.reply(Message::Tune(self.scenarios.current()), from);
        }

        self.status.maybe("Tuning...");
    }

    /* -------------------- helpers -------------------- */

    fn everyone_reported(&self) -> bool {
        self.cfg.reporting_policy == ReportingPolicy::AllReported
            && self.registry.addresses().all(|a| self.reported.contains(&a))
    }

    fn count_ping(&mut self, from: Address) {
        if !self.registry.record_ping(from) {
            warn!("[server] no paired device found ({})", from);
        }
    }

    fn receive(&mut self) -> Option<(Message, Address)> {
        match exchange::receive(&mut self.radio, self.cfg.poll) {
            Ok(m) => m,
            Err(e) => {
                debug!("[server] receive: {}", e);
                None
            }
        }
    }

    fn reply(&mut self, msg: Message, to: Address) {
        if let Err(e) = exchange::send(&mut self.radio, &msg, to) {
            debug!("[server] sending {:?} to {} failed: {}", msg.kind(), to, e);
        }
    }

    fn broadcast(&mut self, msg: Message) {
        let copies = exchange::broadcast_for(&mut self.radio, &msg, self.cfg.broadcast_for, self.cfg.broadcast_gap);
        debug!("[server] broadcast {:?} x{}", msg.kind(), copies);
    }

    fn apply_current_scenario(&mut self) {
        let params = self.scenarios.current();
        info!(
            "[server] ==== scenario {}/{}: {} ====",
            self.scenarios.index() + 1,
            self.scenarios.len(),
            params
        );
        if let Err(e) = retune(&mut self.radio, &params) {
            error!("[server] retune failed: {}", e);
        }
    }
}
