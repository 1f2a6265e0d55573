use anyhow::{Context, Result, bail};

use crate::proto::message::Address;

/// Kind of a line frame on the serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    Ack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub channel: u8,
    pub src: Address,
    pub dst: Address,
    pub seq: u8,
    pub kind: FrameKind,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Acknowledgement for a received data frame.
    pub fn ack_for(&self) -> Frame {
        Frame {
            channel: self.channel,
            src: self.dst,
            dst: self.src,
            seq: self.seq,
            kind: FrameKind::Ack,
            payload: Vec::new(),
        }
    }
}

pub fn hexsum(payload_hex: &str) -> Result<u8> {
    if !payload_hex.is_ascii() || payload_hex.len() % 2 != 0 {
        bail!("bad hex length");
    }
    let mut sum: u8 = 0;
    for i in (0..payload_hex.len()).step_by(2) {
        let b = u8::from_str_radix(&payload_hex[i..i + 2], 16).context("bad hex in PAY")?;
        sum = sum.wrapping_add(b);
    }
    Ok(sum)
}

fn unhex(payload_hex: &str) -> Result<Vec<u8>> {
    (0..payload_hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&payload_hex[i..i + 2], 16).context("bad hex in PAY"))
        .collect()
}

pub fn parse_frame(line: &str) -> Result<Frame> {
    // tolerate leading/trailing markers and flexible order
    let mut channel = None;
    let mut src = None;
    let mut dst = None;
    let mut seq = None;
    let mut kind = None;
    let mut pay = None;
    let mut sum = None;
    for tok in line.split_whitespace() {
        if let Some(v) = tok.strip_prefix("CH=") {
            channel = Some(v.parse::<u8>()?)
        } else if let Some(v) = tok.strip_prefix("SRC=") {
            src = Some(v.parse::<u8>()?)
        } else if let Some(v) = tok.strip_prefix("DST=") {
            dst = Some(v.parse::<u8>()?)
        } else if let Some(v) = tok.strip_prefix("SEQ=") {
            seq = Some(v.parse::<u8>()?)
        } else if let Some(v) = tok.strip_prefix("T=") {
            kind = Some(match v {
                "D" => FrameKind::Data,
                "A" => FrameKind::Ack,
                other => bail!("bad frame kind {other}"),
            })
        } else if let Some(v) = tok.strip_prefix("PAY=") {
            pay = Some(v.to_string())
        } else if let Some(v) = tok.strip_prefix("SUM=") {
            sum = Some(u8::from_str_radix(v, 16)?)
        }
    }
    let (channel, src, dst, seq, kind, pay, sumrx) = (
        channel.ok_or_else(|| anyhow::anyhow!("no CH"))?,
        src.ok_or_else(|| anyhow::anyhow!("no SRC"))?,
        dst.ok_or_else(|| anyhow::anyhow!("no DST"))?,
        seq.ok_or_else(|| anyhow::anyhow!("no SEQ"))?,
        kind.ok_or_else(|| anyhow::anyhow!("no T"))?,
        pay.unwrap_or_default(),
        sum.ok_or_else(|| anyhow::anyhow!("no SUM"))?,
    );
    let calc = hexsum(&pay)?;
    if calc != sumrx {
        bail!("checksum {}!={}", calc, sumrx);
    }
    Ok(Frame {
        channel,
        src,
        dst,
        seq,
        kind,
        payload: unhex(&pay)?,
    })
}

pub fn build_frame(frame: &Frame) -> String {
    let mut sum: u8 = 0;
    let mut s = String::with_capacity(2 * frame.payload.len());
    for &b in &frame.payload {
        sum = sum.wrapping_add(b);
        use std::fmt::Write;
        let _ = write!(s, "{:02X}", b);
    }
    format!(
        "@@ CH={} SRC={} DST={} SEQ={} T={} PAY={} SUM={:02X} ##",
        frame.channel,
        frame.src,
        frame.dst,
        frame.seq,
        match frame.kind {
            FrameKind::Data => "D",
            FrameKind::Ack => "A",
        },
        s,
        sum
    )
}
