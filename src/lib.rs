//! Link-quality benchmark for a star of radio nodes.
//!
//! A [`server::Server`] pairs [`client::Client`]s, lets them ping it for a
//! fixed period, collects their round-trip statistics and then moves the
//! whole fleet to the next radio configuration in a [`scenario::Scenarios`]
//! sweep.

pub mod client;
pub mod config;
pub mod exchange;
pub mod frame;
pub mod link;
pub mod logging;
pub mod port;
pub mod proto;
pub mod registry;
pub mod report;
pub mod scenario;
pub mod server;
pub mod sim;
pub mod stats;
pub mod status;
pub mod timer;
