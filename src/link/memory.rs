use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::{Link, LinkError, Tuner};
use crate::proto::message::{Address, BROADCAST};
use crate::scenario::TuningParams;

type Datagram = (Vec<u8>, Address);

struct Station {
    channel: u8,
    inbox: Sender<Datagram>,
}

struct Ether {
    stations: HashMap<Address, Station>,
    loss: f64,
    rng: StdRng,
}

impl Ether {
    fn lost(&mut self) -> bool {
        self.loss > 0.0 && self.rng.gen_bool(self.loss)
    }
}

/// Shared in-process medium. Every [`MemoryLink`] attached to the same bus
/// hears the others that are tuned to the same channel.
#[derive(Clone)]
pub struct Bus {
    ether: Arc<Mutex<Ether>>,
}

impl Bus {
    /// `loss` is the probability each individual delivery is dropped.
    pub fn new(loss: f64, seed: u64) -> Self {
        Self {
            ether: Arc::new(Mutex::new(Ether {
                stations: HashMap::new(),
                loss: loss.clamp(0.0, 1.0),
                rng: StdRng::seed_from_u64(seed),
            })),
        }
    }

    /// Attach a station at `address`, initially on the power-on channel.
    /// Re-attaching an address replaces the previous station.
    pub fn attach(&self, address: Address) -> MemoryLink {
        let (tx, rx) = mpsc::channel();
        let params = TuningParams::default();
        self.lock().stations.insert(
            address,
            Station {
                channel: params.channel,
                inbox: tx,
            },
        );
        MemoryLink {
            bus: self.clone(),
            address,
            params,
            inbox: rx,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ether> {
        // A panicking station cannot leave the routing table half-updated.
        self.ether.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// One station on a [`Bus`].
pub struct MemoryLink {
    bus: Bus,
    address: Address,
    params: TuningParams,
    inbox: Receiver<Datagram>,
}

impl MemoryLink {
    pub fn params(&self) -> TuningParams {
        self.params
    }
}

impl Link for MemoryLink {
    fn address(&self) -> Address {
        self.address
    }

    fn send_to(&mut self, bytes: &[u8], to: Address) -> Result<(), LinkError> {
        let mut ether = self.bus.lock();
        let channel = self.params.channel;

        if to == BROADCAST {
            let peers: Vec<Sender<Datagram>> = ether
                .stations
                .iter()
                .filter(|(a, s)| **a != self.address && s.channel == channel)
                .map(|(_, s)| s.inbox.clone())
                .collect();
            for inbox in peers {
                if !ether.lost() {
                    let _ = inbox.send((bytes.to_vec(), self.address));
                }
            }
            return Ok(());
        }

        let lost = ether.lost();
        let delivered = match ether.stations.get(&to) {
            Some(s) if s.channel == channel && !lost => s.inbox.send((bytes.to_vec(), self.address)).is_ok(),
            _ => false,
        };
        if delivered {
            Ok(())
        } else {
            debug!("[bus] {} -> {} not delivered", self.address, to);
            Err(LinkError::NotAcknowledged { to, attempts: 1 })
        }
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Datagram>, LinkError> {
        if timeout.is_zero() {
            return match self.inbox.try_recv() {
                Ok(d) => Ok(Some(d)),
                Err(TryRecvError::Empty) => Ok(None),
                Err(TryRecvError::Disconnected) => Err(LinkError::Closed),
            };
        }
        match self.inbox.recv_timeout(timeout) {
            Ok(d) => Ok(Some(d)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Closed),
        }
    }
}

impl Tuner for MemoryLink {
    fn apply(&mut self, params: &TuningParams) -> Result<(), LinkError> {
        self.params = *params;
        if let Some(s) = self.bus.lock().stations.get_mut(&self.address) {
            s.channel = params.channel;
        }
        info!(
            "[bus] {} tuned: channel={} rate={} power={}",
            self.address, params.channel, params.data_rate, params.power
        );
        Ok(())
    }

    fn reinitialize(&mut self) -> Result<(), LinkError> {
        let dropped = self.inbox.try_iter().count();
        if dropped > 0 {
            debug!("[bus] {} dropped {} queued datagram(s)", self.address, dropped);
        }
        Ok(())
    }
}
