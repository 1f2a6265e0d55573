//! Transport and radio-configuration collaborators.
//!
//! The protocol only needs an acknowledged single-hop send and a receive
//! with a timeout; everything below that (framing, acks, retries) lives in
//! the implementations here.

use std::time::Duration;

use thiserror::Error;

use crate::proto::message::Address;
use crate::scenario::TuningParams;

pub mod memory;
#[cfg(test)]
pub(crate) mod scripted;
pub mod serial;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no acknowledgement from {to} after {attempts} attempt(s)")]
    NotAcknowledged { to: Address, attempts: u32 },
    #[error("link closed")]
    Closed,
    #[error("serial: {0}")]
    Serial(#[from] serialport::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Single-hop datagram link.
pub trait Link {
    /// This node's own address.
    fn address(&self) -> Address;

    /// Deliver `bytes` to `to`. Unicast returns only once the peer has
    /// acknowledged; a send to [`crate::proto::message::BROADCAST`] is
    /// best effort.
    fn send_to(&mut self, bytes: &[u8], to: Address) -> Result<(), LinkError>;

    /// Wait up to `timeout` for one datagram addressed to us.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<(Vec<u8>, Address)>, LinkError>;

    fn try_recv(&mut self) -> Result<Option<(Vec<u8>, Address)>, LinkError> {
        self.recv_timeout(Duration::ZERO)
    }
}

/// Radio configuration knobs.
pub trait Tuner {
    fn apply(&mut self, params: &TuningParams) -> Result<(), LinkError>;

    /// Reset the transport, dropping anything in flight.
    fn reinitialize(&mut self) -> Result<(), LinkError>;
}

/// A radio: something that both carries datagrams and can be retuned.
pub trait Radio: Link + Tuner {}

impl<T: Link + Tuner> Radio for T {}

/// Reset the transport and switch to `params`; both ends do this on TUNE.
pub fn retune<T: Tuner + ?Sized>(radio: &mut T, params: &TuningParams) -> Result<(), LinkError> {
    radio.reinitialize()?;
    radio.apply(params)
}
