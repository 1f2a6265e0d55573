use anyhow::{Context, Result, bail};
use std::time::Duration;
use tracing::info;

use radio_bench::client::Client;
use radio_bench::link::serial::SerialLink;

use crate::cli::{ClientOpts, check_address};

pub fn run(opts: ClientOpts) -> Result<()> {
    info!("client: {:?}", opts);
    check_address(opts.address, "client")?;
    check_address(opts.server, "server")?;
    if opts.address == opts.server {
        bail!("client and server share address {}", opts.address);
    }
    let cfg = opts.report.client_config(opts.server)?;

    let link = SerialLink::open(&opts.ser.port(), opts.address)
        .with_context(|| format!("opening {}", opts.ser.dev))?
        .with_retries(opts.ser.retries, Duration::from_millis(opts.ser.ack_ms));

    let mut client = Client::new(link, cfg);
    client.run_while(|_| true);
    Ok(())
}
