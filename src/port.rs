use std::io::{self, Read, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest response frame the bootloader sends (data bytes).
pub const MAX_RX_FRAME: u32 = 256;
/// Largest request frame the bootloader accepts: 256 data bytes plus the
/// length byte and checksum.
pub const MAX_TX_FRAME: u32 = MAX_RX_FRAME + 2;

pub const DEFAULT_BAUD_RATE: u32 = 57_600;
pub const DEFAULT_SERIAL_MODE: &str = "8e1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortOptions {
    /// Port name, e.g. "/dev/ttyUSB0" or "COM3".
    pub device: String,
    pub baud_rate: u32,
    /// Data bits, parity and stop bits, e.g. "8e1".
    pub serial_mode: String,
    /// Bus address for addressed transports (I2C); ignored by serial ports.
    pub bus_addr: u8,
    pub rx_frame_max: u32,
    pub tx_frame_max: u32,
}

impl Default for PortOptions {
    fn default() -> Self {
        Self {
            device: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            serial_mode: DEFAULT_SERIAL_MODE.to_string(),
            bus_addr: 0,
            rx_frame_max: MAX_RX_FRAME,
            tx_frame_max: MAX_TX_FRAME,
        }
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("invalid serial mode '{mode}'")]
    InvalidMode { mode: String },
}

/// An open byte link to the target.
pub trait Port: Read + Write + Send {
    /// Human-readable configuration, e.g. "57600 8E1".
    fn describe(&self) -> String;

    /// Drops anything pending in the input and output buffers.
    fn discard_buffers(&mut self) -> Result<(), TransportError>;

    fn close(&mut self) {}
}

pub trait PortOpener: Send {
    fn open(&mut self, opts: &PortOptions) -> Result<Box<dyn Port>, TransportError>;
}

/// Port-open retry policy.
#[derive(Debug, Clone, Copy)]
pub struct OpenRetry {
    pub attempts: u32,
    pub delay: Duration,
}

/// Opens the port, retrying a fixed number of times with a fixed delay.
///
/// `on_failure` is told about every failed attempt (1-based) before the next
/// one is made. The last error is returned once the attempts run out.
pub fn open_with_retry<F>(
    opener: &mut dyn PortOpener,
    opts: &PortOptions,
    retry: OpenRetry,
    mut on_failure: F,
) -> Result<Box<dyn Port>, (u32, TransportError)>
where
    F: FnMut(u32, &TransportError),
{
    let attempts = retry.attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match opener.open(opts) {
            Ok(port) => return Ok(port),
            Err(e) => {
                on_failure(attempt, &e);
                if attempt >= attempts {
                    return Err((attempt, e));
                }
                std::thread::sleep(retry.delay);
            }
        }
    }
}
