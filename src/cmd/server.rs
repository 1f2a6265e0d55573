use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::time::Duration;
use tracing::info;

use radio_bench::link::serial::SerialLink;
use radio_bench::report::CsvSink;
use radio_bench::server::Server;

use crate::cli::ServerOpts;

pub fn run(opts: ServerOpts) -> Result<()> {
    info!("server: {:?}", opts);
    let cfg = opts.phases.server_config(opts.address)?;
    let scenarios = opts.phases.scenarios()?;

    let out: Box<dyn Write> = match &opts.report_file {
        Some(path) => Box::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening report file {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout()),
    };
    let sink = if opts.csv_header {
        CsvSink::with_header(out).context("writing CSV header")?
    } else {
        CsvSink::new(out)
    };

    let link = SerialLink::open(&opts.ser.port(), cfg.address)
        .with_context(|| format!("opening {}", opts.ser.dev))?
        .with_retries(opts.ser.retries, Duration::from_millis(opts.ser.ack_ms));

    let mut server = Server::new(link, sink, scenarios, cfg);
    server.run_while(|_| true);
    Ok(())
}
