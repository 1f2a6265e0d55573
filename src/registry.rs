use thiserror::Error;

use crate::proto::message::Address;

/// How many clients a server pairs with per cycle by default.
pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("device registry full ({capacity} devices)")]
    Full { capacity: usize },
}

/// Outcome of a successful [`Registry::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Inserted,
    AlreadyPresent,
}

/// What the server itself observes about a paired device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCounters {
    /// PINGs received from the device during the current cycle.
    pub pings: u32,
}

#[derive(Debug, Clone)]
struct Device {
    address: Address,
    counters: DeviceCounters,
}

/// Bounded table of the clients paired in the current cycle.
///
/// Devices are never removed one by one; [`Registry::clear`] at the start of
/// every pairing phase is the only way to forget them.
#[derive(Debug, Clone)]
pub struct Registry {
    devices: Vec<Device>,
    capacity: usize,
}

impl Registry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            devices: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn find(&self, address: Address) -> Option<usize> {
        self.devices.iter().position(|d| d.address == address)
    }

    pub fn add(&mut self, address: Address) -> Result<Admission, RegistryError> {
        if self.find(address).is_some() {
            return Ok(Admission::AlreadyPresent);
        }
        if self.devices.len() >= self.capacity {
            return Err(RegistryError::Full {
                capacity: self.capacity,
            });
        }
        self.devices.push(Device {
            address,
            counters: DeviceCounters::default(),
        });
        Ok(Admission::Inserted)
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }

    pub fn stats_for(&self, address: Address) -> Option<&DeviceCounters> {
        self.find(address).map(|i| &self.devices[i].counters)
    }

    pub fn stats_for_mut(&mut self, address: Address) -> Option<&mut DeviceCounters> {
        self.find(address).map(move |i| &mut self.devices[i].counters)
    }

    /// Bump the ping counter of `address`; false if it is not paired.
    pub fn record_ping(&mut self, address: Address) -> bool {
        match self.stats_for_mut(address) {
            Some(c) => {
                c.pings = c.pings.saturating_add(1);
                true
            }
            None => false,
        }
    }

    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.devices.iter().map(|d| d.address)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}
