use thiserror::Error;

use crate::scenario::{DataRate, TuningParams, TxPower};

/// Peer identifier on the link.
pub type Address = u8;

/// Reserved destination meaning "every listener".
pub const BROADCAST: Address = 0xFF;

/// Tag byte plus the largest payload (the report).
pub const WIRE_SIZE: usize = 1 + REPORT_SIZE;

const REPORT_SIZE: usize = 3 * 4 + 3 * 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected message length: expected {expected}, actual {actual}")]
    Length { expected: usize, actual: usize },
    #[error("unknown message tag: {0}")]
    UnknownTag(u8),
    #[error("invalid {field} code: {code}")]
    BadCode { field: &'static str, code: u8 },
}

/// Compact per-phase summary a client sends in a REPORT.
///
/// Latency fields are narrowed to `u16`; see [`crate::stats::Stats::to_report`]
/// for the saturation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Report {
    /// Total number of send attempts.
    pub num_total: u32,
    /// Number of acknowledged sends.
    pub num_success: u32,
    /// Number of matching replies.
    pub num_reply: u32,
    pub avg_ping_ms: u16,
    pub min_ping_ms: u16,
    pub max_ping_ms: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Error,
    Ok,
    Hello,
    Welcome,
    Work,
    Ping,
    Pong,
    Tune,
    Query,
    Report,
}

impl MessageKind {
    pub fn tag(self) -> u8 {
        match self {
            MessageKind::Error => 0,
            MessageKind::Ok => 1,
            MessageKind::Hello => 2,
            MessageKind::Welcome => 3,
            MessageKind::Work => 4,
            MessageKind::Ping => 5,
            MessageKind::Pong => 6,
            MessageKind::Tune => 7,
            MessageKind::Query => 8,
            MessageKind::Report => 9,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, CodecError> {
        Ok(match tag {
            0 => MessageKind::Error,
            1 => MessageKind::Ok,
            2 => MessageKind::Hello,
            3 => MessageKind::Welcome,
            4 => MessageKind::Work,
            5 => MessageKind::Ping,
            6 => MessageKind::Pong,
            7 => MessageKind::Tune,
            8 => MessageKind::Query,
            9 => MessageKind::Report,
            other => return Err(CodecError::UnknownTag(other)),
        })
    }
}

/// The unit of exchange between server and clients.
///
/// Every variant owns exactly the payload its tag implies, so there is no way
/// to read a payload that was not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    Error,
    Ok,
    Hello,
    Welcome,
    Work,
    Ping { timestamp_ms: u32 },
    Pong { timestamp_ms: u32 },
    Tune(TuningParams),
    Query,
    Report(Report),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Error => MessageKind::Error,
            Message::Ok => MessageKind::Ok,
            Message::Hello => MessageKind::Hello,
            Message::Welcome => MessageKind::Welcome,
            Message::Work => MessageKind::Work,
            Message::Ping { .. } => MessageKind::Ping,
            Message::Pong { .. } => MessageKind::Pong,
            Message::Tune(_) => MessageKind::Tune,
            Message::Query => MessageKind::Query,
            Message::Report(_) => MessageKind::Report,
        }
    }

    /// Serialize into the fixed wire layout. Unused payload bytes are zero.
    pub fn encode(&self) -> [u8; WIRE_SIZE] {
        let mut buf = [0u8; WIRE_SIZE];
        buf[0] = self.kind().tag();
        let body = &mut buf[1..];
        match self {
            Message::Ping { timestamp_ms } | Message::Pong { timestamp_ms } => {
                body[..4].copy_from_slice(&timestamp_ms.to_le_bytes());
            }
            Message::Tune(p) => {
                body[0] = p.channel;
                body[1] = p.data_rate.code();
                body[2] = p.power.code();
            }
            Message::Report(r) => {
                body[0..4].copy_from_slice(&r.num_total.to_le_bytes());
                body[4..8].copy_from_slice(&r.num_success.to_le_bytes());
                body[8..12].copy_from_slice(&r.num_reply.to_le_bytes());
                body[12..14].copy_from_slice(&r.avg_ping_ms.to_le_bytes());
                body[14..16].copy_from_slice(&r.min_ping_ms.to_le_bytes());
                body[16..18].copy_from_slice(&r.max_ping_ms.to_le_bytes());
            }
            Message::Error
            | Message::Ok
            | Message::Hello
            | Message::Welcome
            | Message::Work
            | Message::Query => {}
        }
        buf
    }

    /// Parse a received buffer. Anything but exactly [`WIRE_SIZE`] bytes is
    /// rejected before the tag is looked at.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != WIRE_SIZE {
            return Err(CodecError::Length {
                expected: WIRE_SIZE,
                actual: bytes.len(),
            });
        }
        let body = &bytes[1..];
        let u32_at = |i: usize| u32::from_le_bytes([body[i], body[i + 1], body[i + 2], body[i + 3]]);
        let u16_at = |i: usize| u16::from_le_bytes([body[i], body[i + 1]]);

        Ok(match MessageKind::from_tag(bytes[0])? {
            MessageKind::Error => Message::Error,
            MessageKind::Ok => Message::Ok,
            MessageKind::Hello => Message::Hello,
            MessageKind::Welcome => Message::Welcome,
            MessageKind::Work => Message::Work,
            MessageKind::Ping => Message::Ping {
                timestamp_ms: u32_at(0),
            },
            MessageKind::Pong => Message::Pong {
                timestamp_ms: u32_at(0),
            },
            MessageKind::Tune => Message::Tune(TuningParams {
                channel: body[0],
                data_rate: DataRate::from_code(body[1]).ok_or(CodecError::BadCode {
                    field: "data rate",
                    code: body[1],
                })?,
                power: TxPower::from_code(body[2]).ok_or(CodecError::BadCode {
                    field: "power",
                    code: body[2],
                })?,
            }),
            MessageKind::Query => Message::Query,
            MessageKind::Report => Message::Report(Report {
                num_total: u32_at(0),
                num_success: u32_at(4),
                num_reply: u32_at(8),
                avg_ping_ms: u16_at(12),
                min_ping_ms: u16_at(14),
                max_ping_ms: u16_at(16),
            }),
        })
    }
}
