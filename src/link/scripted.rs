//! Deterministic radio for state machine unit tests: replies come from a
//! script, one per unicast send.

use std::collections::VecDeque;
use std::time::Duration;

use super::{Link, LinkError, Tuner};
use crate::proto::message::{Address, BROADCAST, Message};
use crate::scenario::TuningParams;

pub enum Reply {
    /// Answer with this message from this address.
    Msg(Message, Address),
    /// Answer a PING with the matching PONG.
    Echo(Address),
    /// Stay silent.
    Silence,
    /// Fail the send itself.
    Unacked,
}

#[derive(Default)]
pub struct ScriptedRadio {
    pub address: Address,
    pub script: VecDeque<Reply>,
    pub inbox: VecDeque<(Vec<u8>, Address)>,
    pub sent: Vec<(Message, Address)>,
    pub applied: Vec<TuningParams>,
    pub reinits: u32,
}

impl ScriptedRadio {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }

    pub fn then(mut self, reply: Reply) -> Self {
        self.script.push_back(reply);
        self
    }

    pub fn inject(&mut self, msg: Message, from: Address) {
        self.inbox.push_back((msg.encode().to_vec(), from));
    }

    pub fn unicasts(&self) -> Vec<(Message, Address)> {
        self.sent.iter().filter(|(_, to)| *to != BROADCAST).copied().collect()
    }

    pub fn broadcasts(&self) -> Vec<Message> {
        self.sent
            .iter()
            .filter(|(_, to)| *to == BROADCAST)
            .map(|(m, _)| *m)
            .collect()
    }
}

impl Link for ScriptedRadio {
    fn address(&self) -> Address {
        self.address
    }

    fn send_to(&mut self, bytes: &[u8], to: Address) -> Result<(), LinkError> {
        let msg = Message::decode(bytes).expect("scripted radio only carries valid messages");
        if to == BROADCAST {
            self.sent.push((msg, to));
            return Ok(());
        }
        match self.script.pop_front() {
            Some(Reply::Unacked) => return Err(LinkError::NotAcknowledged { to, attempts: 1 }),
            Some(Reply::Msg(m, from)) => self.inbox.push_back((m.encode().to_vec(), from)),
            Some(Reply::Echo(from)) => {
                if let Message::Ping { timestamp_ms } = msg {
                    let pong = Message::Pong { timestamp_ms };
                    self.inbox.push_back((pong.encode().to_vec(), from));
                }
            }
            Some(Reply::Silence) | None => {}
        }
        self.sent.push((msg, to));
        Ok(())
    }

    fn recv_timeout(&mut self, _timeout: Duration) -> Result<Option<(Vec<u8>, Address)>, LinkError> {
        Ok(self.inbox.pop_front())
    }
}

impl Tuner for ScriptedRadio {
    fn apply(&mut self, params: &TuningParams) -> Result<(), LinkError> {
        self.applied.push(*params);
        Ok(())
    }

    fn reinitialize(&mut self) -> Result<(), LinkError> {
        self.reinits += 1;
        self.inbox.clear();
        Ok(())
    }
}
