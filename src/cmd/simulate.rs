use anyhow::{Result, bail};
use tracing::info;

use radio_bench::config::DEFAULT_SERVER_ADDRESS;
use radio_bench::report::CsvSink;
use radio_bench::sim::{self, SimOptions};

use crate::cli::SimOpts;

pub fn run(opts: SimOpts) -> Result<()> {
    let server = opts.phases.server_config(DEFAULT_SERVER_ADDRESS)?;
    let max = sim::max_clients(&server);
    if opts.clients == 0 || usize::from(opts.clients) > max {
        bail!("--clients must be within 1..={max}");
    }

    let out = std::io::stdout();
    let sink = if opts.csv_header {
        CsvSink::with_header(out)?
    } else {
        CsvSink::new(out)
    };
    let sim_opts = SimOptions {
        clients: opts.clients,
        loss: opts.loss,
        seed: opts.seed,
        cycles: opts.cycles,
        scenarios: opts.phases.scenarios()?,
        client: opts.report.client_config(server.address)?,
        server,
    };
    sim::run(sim_opts, sink)?;
    info!("[sim] done");
    Ok(())
}
