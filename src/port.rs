use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::time::Duration;

use crate::link::LinkError;

/// Read timeout of the port; bounds how late a receive deadline is noticed.
pub const READ_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct SerialOpts {
    /// Serial device path
    pub dev: String,
    /// Baud rate for the fastest data rate
    pub baud: u32,
    /// Enable RTS/CTS
    pub rtscts: bool,
}

pub fn open_port(opts: &SerialOpts) -> Result<Box<dyn SerialPort>, LinkError> {
    let builder = serialport::new(&opts.dev, opts.baud)
        .timeout(READ_SLICE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(if opts.rtscts {
            FlowControl::Hardware
        } else {
            FlowControl::None
        });

    Ok(builder.open()?)
}
