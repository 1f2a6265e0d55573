//! Whole-fleet run in one process: a server and its clients as threads on a
//! lossy [`Bus`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use thiserror::Error;
use tracing::info;

use crate::client::Client;
use crate::config::{ClientConfig, ServerConfig};
use crate::link::memory::Bus;
use crate::proto::message::BROADCAST;
use crate::report::ReportSink;
use crate::scenario::Scenarios;
use crate::server::Server;

#[derive(Debug, Clone)]
pub struct SimOptions {
    pub clients: u8,
    /// Per-delivery drop probability.
    pub loss: f64,
    pub seed: u64,
    /// Scenario cycles to complete before stopping.
    pub cycles: u64,
    pub scenarios: Scenarios,
    pub server: ServerConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimError {
    #[error("client count {clients} outside 1..={max}")]
    ClientCount { clients: u8, max: usize },
}

/// Most clients that fit between the server address and broadcast, and in
/// the server's registry.
pub fn max_clients(server: &ServerConfig) -> usize {
    let addresses = usize::from(BROADCAST.saturating_sub(server.address).saturating_sub(1));
    server.registry_capacity.min(addresses)
}

/// Run until the server has finished `cycles` tuning phases; returns the
/// sink with everything reported on the way.
///
/// Clients take the addresses right after the server's.
pub fn run<S: ReportSink>(opts: SimOptions, sink: S) -> Result<S, SimError> {
    let max = max_clients(&opts.server);
    if opts.clients == 0 || usize::from(opts.clients) > max {
        return Err(SimError::ClientCount {
            clients: opts.clients,
            max,
        });
    }

    let bus = Bus::new(opts.loss, opts.seed);
    let done = AtomicBool::new(false);
    let server_link = bus.attach(opts.server.address);
    let client_cfg = ClientConfig {
        server: opts.server.address,
        ..opts.client
    };

    info!(
        "[sim] {} client(s), loss={:.2}, {} cycle(s) over {} scenario(s)",
        opts.clients,
        opts.loss,
        opts.cycles,
        opts.scenarios.len()
    );

    Ok(thread::scope(|scope| {
        for address in (1..=opts.clients).map(|i| opts.server.address + i) {
            let link = bus.attach(address);
            let cfg = client_cfg.clone();
            let seed = opts.seed.wrapping_add(u64::from(address));
            let done = &done;
            scope.spawn(move || {
                let mut client = Client::new(link, cfg).with_seed(seed);
                client.run_while(|_| !done.load(Ordering::Relaxed));
            });
        }

        let mut server = Server::new(server_link, sink, opts.scenarios, opts.server);
        server.run_while(|s| s.cycles() < opts.cycles);
        done.store(true, Ordering::Relaxed);
        server.into_sink()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportRecord;

    fn opts(clients: u8, server: ServerConfig) -> SimOptions {
        SimOptions {
            clients,
            loss: 0.0,
            seed: 0,
            cycles: 1,
            scenarios: Scenarios::default(),
            server,
            client: ClientConfig::default(),
        }
    }

    #[test]
    fn client_count_is_bounded_by_address_space() {
        let server = ServerConfig {
            address: 250,
            ..Default::default()
        };
        assert_eq!(max_clients(&server), 4);
        assert_eq!(
            run(opts(5, server.clone()), Vec::<ReportRecord>::new()),
            Err(SimError::ClientCount { clients: 5, max: 4 })
        );
        assert!(run(opts(255, ServerConfig::default()), Vec::<ReportRecord>::new()).is_err());
        assert!(run(opts(0, ServerConfig::default()), Vec::<ReportRecord>::new()).is_err());
    }

    #[test]
    fn client_count_is_bounded_by_registry() {
        let server = ServerConfig {
            registry_capacity: 2,
            ..Default::default()
        };
        assert_eq!(max_clients(&server), 2);
        assert!(run(opts(3, server), Vec::<ReportRecord>::new()).is_err());
    }
}
