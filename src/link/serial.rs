use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, info};

use super::{Link, LinkError, Tuner};
use crate::frame::{Frame, FrameKind, build_frame, parse_frame};
use crate::port::{SerialOpts, open_port};
use crate::proto::message::{Address, BROADCAST};
use crate::scenario::TuningParams;

pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(200);
pub const DEFAULT_RETRIES: u32 = 3;
/// How long a `(src, seq)` pair counts as a retransmission of the last
/// frame from `src`. Must outlast a sender's full retry cycle.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(2);

/// Broadcasts are never acknowledged or deduplicated; they carry this seq.
const BROADCAST_SEQ: u8 = 0;

/// Datagram link over a shared serial line (a transparent radio modem, or a
/// bus of wired nodes).
///
/// Frames are CRLF-terminated text lines. Unicast data is acknowledged by
/// the receiver and retried by the sender; the logical channel tag keeps
/// nodes tuned to different channels from hearing each other.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    reader: BufReader<Box<dyn SerialPort>>,
    line: Vec<u8>,
    address: Address,
    base_baud: u32,
    params: TuningParams,
    /// Next unicast sequence number, per destination.
    next_seq: HashMap<Address, u8>,
    ack_timeout: Duration,
    retries: u32,
    dedup_window: Duration,
    pending: VecDeque<(Vec<u8>, Address)>,
    last_seen: HashMap<Address, (u8, Instant)>,
}

impl SerialLink {
    pub fn open(opts: &SerialOpts, address: Address) -> Result<Self, LinkError> {
        Self::with_port(open_port(opts)?, address, opts.baud)
    }

    /// Build on an already opened port; `base_baud` is the 2mbps rate.
    pub fn with_port(port: Box<dyn SerialPort>, address: Address, base_baud: u32) -> Result<Self, LinkError> {
        let reader = BufReader::new(port.try_clone()?); // independent read/write handles
        let params = TuningParams::default();
        let mut link = Self {
            port,
            reader,
            line: Vec::new(),
            address,
            base_baud,
            params,
            next_seq: HashMap::new(),
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            retries: DEFAULT_RETRIES,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            pending: VecDeque::new(),
            last_seen: HashMap::new(),
        };
        link.apply(&params)?;
        Ok(link)
    }

    pub fn with_retries(mut self, retries: u32, ack_timeout: Duration) -> Self {
        self.retries = retries;
        self.ack_timeout = ack_timeout;
        self
    }

    fn next_seq(&mut self, to: Address) -> u8 {
        let seq = self.next_seq.entry(to).or_insert(0);
        *seq = seq.wrapping_add(1);
        *seq
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<(), LinkError> {
        let mut out = build_frame(frame).into_bytes();
        out.extend_from_slice(b"\r\n");
        self.port.write_all(&out)?;
        Ok(())
    }

    /// Next well-formed frame, or `None` once `deadline` has passed.
    ///
    /// Every call reads at least once, so a zero timeout still picks up
    /// whatever is already buffered. Callers that skip the returned frame
    /// must check the deadline themselves before asking again.
    fn read_frame(&mut self, deadline: Instant) -> Result<Option<Frame>, LinkError> {
        loop {
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(_) if self.line.ends_with(b"\n") => {
                    let text = String::from_utf8_lossy(&self.line).trim().to_string();
                    self.line.clear();
                    match parse_frame(&text) {
                        Ok(f) => return Ok(Some(f)),
                        Err(err) => debug!("[serial] bad frame: {} line=\"{}\"", err, text),
                    }
                }
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) => return Err(e.into()),
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    /// Filter a frame meant for upper layers, acknowledging unicast data.
    fn accept(&mut self, frame: Frame) -> Result<Option<(Vec<u8>, Address)>, LinkError> {
        if frame.channel != self.params.channel
            || frame.src == self.address
            || (frame.dst != self.address && frame.dst != BROADCAST)
            || frame.kind != FrameKind::Data
        {
            return Ok(None);
        }
        if frame.dst != BROADCAST {
            self.write_frame(&frame.ack_for())?;
            if let Some(&(seq, at)) = self.last_seen.get(&frame.src)
                && seq == frame.seq
                && at.elapsed() < self.dedup_window
            {
                debug!("[serial] duplicate seq={} from {}", frame.seq, frame.src);
                return Ok(None);
            }
            self.last_seen.insert(frame.src, (frame.seq, Instant::now()));
        }
        Ok(Some((frame.payload, frame.src)))
    }

    fn is_ack(&self, frame: &Frame, to: Address, seq: u8) -> bool {
        frame.kind == FrameKind::Ack
            && frame.channel == self.params.channel
            && frame.src == to
            && frame.dst == self.address
            && frame.seq == seq
    }
}

impl Link for SerialLink {
    fn address(&self) -> Address {
        self.address
    }

    fn send_to(&mut self, bytes: &[u8], to: Address) -> Result<(), LinkError> {
        let mut frame = Frame {
            channel: self.params.channel,
            src: self.address,
            dst: to,
            seq: BROADCAST_SEQ,
            kind: FrameKind::Data,
            payload: bytes.to_vec(),
        };
        if to == BROADCAST {
            return self.write_frame(&frame);
        }
        frame.seq = self.next_seq(to);

        let attempts = self.retries + 1;
        for _ in 0..attempts {
            self.write_frame(&frame)?;
            let deadline = Instant::now() + self.ack_timeout;
            while let Some(f) = self.read_frame(deadline)? {
                if self.is_ack(&f, to, frame.seq) {
                    return Ok(());
                }
                if let Some(datagram) = self.accept(f)? {
                    self.pending.push_back(datagram);
                }
                if Instant::now() >= deadline {
                    break;
                }
            }
        }
        Err(LinkError::NotAcknowledged { to, attempts })
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<(Vec<u8>, Address)>, LinkError> {
        if let Some(datagram) = self.pending.pop_front() {
            return Ok(Some(datagram));
        }
        let deadline = Instant::now() + timeout;
        while let Some(f) = self.read_frame(deadline)? {
            if let Some(datagram) = self.accept(f)? {
                return Ok(Some(datagram));
            }
            if Instant::now() >= deadline {
                break;
            }
        }
        Ok(None)
    }
}

impl Tuner for SerialLink {
    fn apply(&mut self, params: &TuningParams) -> Result<(), LinkError> {
        let baud = self.base_baud / params.data_rate.divisor();
        self.port.set_baud_rate(baud)?;
        self.params = *params;
        info!(
            "[serial] channel={} rate={} (baud={}) power={}",
            params.channel, params.data_rate, baud, params.power
        );
        Ok(())
    }

    /// Sequence counters survive: peers still remember what they last saw
    /// from us.
    fn reinitialize(&mut self) -> Result<(), LinkError> {
        self.port.clear(ClearBuffer::All)?;
        self.reader = BufReader::new(self.port.try_clone()?);
        self.line.clear();
        self.pending.clear();
        self.last_seen.clear();
        Ok(())
    }
}
