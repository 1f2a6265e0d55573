use std::fmt;
use std::io::Write;

use tracing::error;

use crate::proto::message::{Address, Report};
use crate::scenario::TuningParams;

pub const CSV_HEADER: &str =
    "channel,data_rate,power,address,num_total,num_success,num_reply,avg_ping,min_ping,max_ping,server_pings";

/// One line of benchmark output: a client's self-measured stats for a
/// scenario next to what the server counted for the same device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRecord {
    pub params: TuningParams,
    pub from: Address,
    pub report: Report,
    /// PINGs the server saw from this device; `None` if it is not paired.
    pub server_pings: Option<u32>,
}

impl fmt::Display for ReportRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.report;
        write!(
            f,
            "{},{},{},{},{},{},{},{},{},{},",
            self.params.channel,
            self.params.data_rate.code(),
            self.params.power.code(),
            self.from,
            r.num_total,
            r.num_success,
            r.num_reply,
            r.avg_ping_ms,
            r.min_ping_ms,
            r.max_ping_ms,
        )?;
        match self.server_pings {
            Some(n) => write!(f, "{n}"),
            None => f.write_str("-1"),
        }
    }
}

/// Destination for report records.
pub trait ReportSink {
    fn emit(&mut self, record: &ReportRecord);
}

impl ReportSink for Vec<ReportRecord> {
    fn emit(&mut self, record: &ReportRecord) {
        self.push(record.clone());
    }
}

/// Writes one CSV line per record, flushing after each.
pub struct CsvSink<W: Write> {
    out: W,
}

impl<W: Write> CsvSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn with_header(mut out: W) -> std::io::Result<Self> {
        writeln!(out, "{CSV_HEADER}")?;
        Ok(Self { out })
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for CsvSink<W> {
    fn emit(&mut self, record: &ReportRecord) {
        if let Err(e) = writeln!(self.out, "{record}").and_then(|_| self.out.flush()) {
            error!("[report] failed to write record: {}", e);
        }
    }
}
