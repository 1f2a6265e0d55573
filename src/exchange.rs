//! Message-level exchange on top of a [`Link`].
//!
//! Every failure here is recoverable: callers log it and retry on a later
//! tick.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::link::{Link, LinkError};
use crate::proto::message::{Address, BROADCAST, CodecError, Message};

/// Pause between two copies of a repeated broadcast.
pub const BROADCAST_GAP: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("malformed message from {from}: {source}")]
    Malformed { from: Address, source: CodecError },
    #[error("timed out waiting for reply")]
    Timeout,
}

pub fn send<L: Link + ?Sized>(link: &mut L, msg: &Message, to: Address) -> Result<(), ExchangeError> {
    link.send_to(&msg.encode(), to)?;
    Ok(())
}

fn decode(bytes: Vec<u8>, from: Address) -> Result<(Message, Address), ExchangeError> {
    match Message::decode(&bytes) {
        Ok(m) => Ok((m, from)),
        Err(source) => {
            warn!("[exchange] discarding malformed message from {}: {}", from, source);
            Err(ExchangeError::Malformed { from, source })
        }
    }
}

/// Wait up to `timeout` for one message. `Ok(None)` on silence.
pub fn receive<L: Link + ?Sized>(
    link: &mut L,
    timeout: Duration,
) -> Result<Option<(Message, Address)>, ExchangeError> {
    match link.recv_timeout(timeout)? {
        Some((bytes, from)) => decode(bytes, from).map(Some),
        None => Ok(None),
    }
}

/// Non-blocking [`receive`].
pub fn poll<L: Link + ?Sized>(link: &mut L) -> Result<Option<(Message, Address)>, ExchangeError> {
    match link.try_recv()? {
        Some((bytes, from)) => decode(bytes, from).map(Some),
        None => Ok(None),
    }
}

/// Send `msg` to `to` and wait for whatever comes back first.
///
/// The reply is not checked for type or sender; state machines decide what a
/// reply means in their current state.
pub fn request<L: Link + ?Sized>(
    link: &mut L,
    msg: &Message,
    to: Address,
    timeout: Duration,
) -> Result<(Message, Address), ExchangeError> {
    send(link, msg, to)?;
    receive(link, timeout)?.ok_or(ExchangeError::Timeout)
}

/// Keep broadcasting `msg` for roughly `duration`. Individual failures are
/// ignored; nobody acknowledges a broadcast. Returns the number of copies
/// sent.
pub fn broadcast_for<L: Link + ?Sized>(link: &mut L, msg: &Message, duration: Duration, gap: Duration) -> u32 {
    let wire = msg.encode();
    let start = Instant::now();
    let mut copies = 0;
    while start.elapsed() < duration {
        match link.send_to(&wire, BROADCAST) {
            Ok(()) => copies += 1,
            Err(e) => debug!("[exchange] broadcast copy failed: {}", e),
        }
        std::thread::sleep(gap);
    }
    copies
}

/// Discard everything already queued, e.g. trailing broadcast copies.
pub fn drain<L: Link + ?Sized>(link: &mut L) -> usize {
    let mut n = 0;
    while let Ok(Some(_)) = link.try_recv() {
        n += 1;
    }
    n
}
