use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use radio_bench::config::{ClientConfig, DEFAULT_SERVER_ADDRESS, ReportingPolicy, ServerConfig};
use radio_bench::port::SerialOpts;
use radio_bench::proto::message::{Address, BROADCAST};
use radio_bench::scenario::{Scenarios, TuningParams};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "radio-bench",
    about = "Benchmark link quality across a sweep of radio configurations"
)]
pub struct Cli {
    /// Log filter (RUST_LOG syntax), e.g. "debug" or "radio_bench=trace"
    #[arg(long, global = true)]
    pub log: Option<String>,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Coordinate clients and print one CSV record per report
    Server(ServerOpts),
    /// Run a field node
    Client(ClientOpts),
    /// Run a server and clients in-process over a lossy simulated link
    Simulate(SimOpts),
}

#[derive(Args, Debug, Clone)]
pub struct SerialArgs {
    /// Serial device path
    #[arg(long, default_value = "/dev/ttyS0")]
    pub dev: String,
    /// Baud rate used for the 2mbps data rate (1mbps = /2, 250kbps = /8)
    #[arg(long, default_value_t = 230_400)]
    pub baud: u32,
    /// Enable RTS/CTS
    #[arg(long, default_value_t = false)]
    pub rtscts: bool,
    /// Retransmissions of an unacknowledged frame
    #[arg(long, default_value_t = radio_bench::link::serial::DEFAULT_RETRIES)]
    pub retries: u32,
    /// Wait for an acknowledgement, in ms
    #[arg(long, default_value_t = 200)]
    pub ack_ms: u64,
}

impl SerialArgs {
    pub fn port(&self) -> SerialOpts {
        SerialOpts {
            dev: self.dev.clone(),
            baud: self.baud,
            rtscts: self.rtscts,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum PolicyArg {
    /// Always wait for the full reporting period
    Ceiling,
    /// Stop as soon as every paired device has reported
    AllReported,
}

impl From<PolicyArg> for ReportingPolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::Ceiling => ReportingPolicy::Ceiling,
            PolicyArg::AllReported => ReportingPolicy::AllReported,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PhaseArgs {
    /// Pairing period in ms
    #[arg(long, default_value_t = 10_000)]
    pub pairing_ms: u64,
    /// Working period in ms
    #[arg(long, default_value_t = 10_000)]
    pub work_ms: u64,
    /// Maximum reporting period in ms
    #[arg(long, default_value_t = 30_000)]
    pub reporting_ms: u64,
    /// Tuning period in ms
    #[arg(long, default_value_t = 10_000)]
    pub tuning_ms: u64,
    /// How long phase-change broadcasts are repeated, in ms
    #[arg(long, default_value_t = 2_000)]
    pub broadcast_ms: u64,
    /// When to leave the reporting phase
    #[arg(long, value_enum, default_value_t = PolicyArg::Ceiling)]
    pub reporting_policy: PolicyArg,
    /// Maximum number of paired devices
    #[arg(long, default_value_t = radio_bench::registry::DEFAULT_CAPACITY)]
    pub capacity: usize,
    /// Scenario as <channel>:<rate>:<power>, e.g. 2:250kbps:-18dbm.
    /// Repeat for a sweep; defaults to the built-in sweep.
    #[arg(long = "scenario")]
    pub scenarios: Vec<TuningParams>,
}

impl PhaseArgs {
    pub fn server_config(&self, address: Address) -> Result<ServerConfig> {
        check_address(address, "server")?;
        Ok(ServerConfig {
            address,
            pairing_period: Duration::from_millis(self.pairing_ms),
            work_period: Duration::from_millis(self.work_ms),
            reporting_ceiling: Duration::from_millis(self.reporting_ms),
            tuning_period: Duration::from_millis(self.tuning_ms),
            broadcast_for: Duration::from_millis(self.broadcast_ms),
            reporting_policy: self.reporting_policy.into(),
            registry_capacity: self.capacity,
            ..Default::default()
        })
    }

    pub fn scenarios(&self) -> Result<Scenarios> {
        if self.scenarios.is_empty() {
            return Ok(Scenarios::default());
        }
        Ok(Scenarios::new(self.scenarios.clone())?)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServerOpts {
    #[command(flatten)]
    pub ser: SerialArgs,
    #[command(flatten)]
    pub phases: PhaseArgs,
    /// This node's address
    #[arg(long, default_value_t = DEFAULT_SERVER_ADDRESS)]
    pub address: Address,
    /// Append records to this file instead of stdout
    #[arg(long)]
    pub report_file: Option<PathBuf>,
    /// Write a CSV header before the first record
    #[arg(long, default_value_t = false)]
    pub csv_header: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// Give up reporting after this many attempts and re-pair (default: never)
    #[arg(long)]
    pub report_attempts: Option<u32>,
    /// Wait for a reply from the server, in ms
    #[arg(long, default_value_t = 2_000)]
    pub reply_timeout_ms: u64,
}

impl ReportArgs {
    pub fn client_config(&self, server: Address) -> Result<ClientConfig> {
        if self.report_attempts == Some(0) {
            bail!("--report-attempts must be at least 1");
        }
        Ok(ClientConfig {
            server,
            reply_timeout: Duration::from_millis(self.reply_timeout_ms),
            report_attempt_limit: self.report_attempts,
            ..Default::default()
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientOpts {
    #[command(flatten)]
    pub ser: SerialArgs,
    #[command(flatten)]
    pub report: ReportArgs,
    /// This node's address
    #[arg(long)]
    pub address: Address,
    /// Server address
    #[arg(long, default_value_t = DEFAULT_SERVER_ADDRESS)]
    pub server: Address,
}

#[derive(Args, Debug, Clone)]
pub struct SimOpts {
    #[command(flatten)]
    pub phases: PhaseArgs,
    #[command(flatten)]
    pub report: ReportArgs,
    /// Number of simulated clients
    #[arg(long, default_value_t = 3)]
    pub clients: u8,
    /// Probability (0.0..=1.0) that any single delivery is lost
    #[arg(long, default_value_t = 0.0, value_parser = parse_loss)]
    pub loss: f64,
    /// Seed for loss and jitter
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
    /// Scenario cycles to run before exiting
    #[arg(long, default_value_t = 1)]
    pub cycles: u64,
    /// Write a CSV header before the first record
    #[arg(long, default_value_t = false)]
    pub csv_header: bool,
}

fn parse_loss(s: &str) -> Result<f64, String> {
    let p: f64 = s.parse().map_err(|_| format!("loss must be a number, got {s:?}"))?;
    if !(0.0..=1.0).contains(&p) {
        return Err(format!("loss must be within 0.0..=1.0, got {p}"));
    }
    Ok(p)
}

pub fn check_address(address: Address, what: &str) -> Result<()> {
    if address == BROADCAST {
        bail!("{what} address {address} is reserved for broadcast");
    }
    Ok(())
}
