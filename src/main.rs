use anyhow::Result;
use clap::Parser;

mod cli;
mod cmd;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    radio_bench::logging::init(args.log.as_deref())?;
    match args.cmd {
        cli::Cmd::Server(opts) => cmd::server::run(opts),
        cli::Cmd::Client(opts) => cmd::client::run(opts),
        cli::Cmd::Simulate(opts) => cmd::simulate::run(opts),
    }
}
