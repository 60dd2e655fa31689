use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::port::{Port, PortOpener, PortOptions, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialMode {
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl SerialMode {
    /// Parses modes like "8e1" or "8N2" (case-insensitive).
    pub fn parse(mode: &str) -> Result<Self, TransportError> {
        let invalid = || TransportError::InvalidMode {
            mode: mode.to_string(),
        };

        let bytes = mode.trim().as_bytes();
        let &[d, p, s] = bytes else {
            return Err(invalid());
        };

        let data_bits = match d {
            b'5' => DataBits::Five,
            b'6' => DataBits::Six,
            b'7' => DataBits::Seven,
            b'8' => DataBits::Eight,
            _ => return Err(invalid()),
        };
        let parity = match p.to_ascii_lowercase() {
            b'n' => Parity::None,
            b'e' => Parity::Even,
            b'o' => Parity::Odd,
            _ => return Err(invalid()),
        };
        let stop_bits = match s {
            b'1' => StopBits::One,
            b'2' => StopBits::Two,
            _ => return Err(invalid()),
        };

        Ok(Self {
            data_bits,
            parity,
            stop_bits,
        })
    }

    fn label(&self) -> String {
        let d = match self.data_bits {
            DataBits::Five => '5',
            DataBits::Six => '6',
            DataBits::Seven => '7',
            DataBits::Eight => '8',
        };
        let p = match self.parity {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        };
        let s = match self.stop_bits {
            StopBits::One => '1',
            StopBits::Two => '2',
        };
        format!("{d}{p}{s}")
    }
}

/// Opens ports through the `serialport` crate.
#[derive(Debug, Clone)]
pub struct SerialPortOpener {
    pub timeout: Duration,
}

impl Default for SerialPortOpener {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

impl PortOpener for SerialPortOpener {
    fn open(&mut self, opts: &PortOptions) -> Result<Box<dyn Port>, TransportError> {
        let mode = SerialMode::parse(&opts.serial_mode)?;
        let port = serialport::new(&opts.device, opts.baud_rate)
            .data_bits(mode.data_bits)
            .parity(mode.parity)
            .stop_bits(mode.stop_bits)
            .flow_control(FlowControl::None)
            .timeout(self.timeout)
            .open()?;

        tracing::debug!(device = %opts.device, baud = opts.baud_rate, "serial port opened");

        Ok(Box::new(SerialLink {
            port: Some(port),
            description: format!("{} {}", opts.baud_rate, mode.label()),
        }))
    }
}

pub struct SerialLink {
    port: Option<Box<dyn SerialPort>>,
    description: String,
}

impl SerialLink {
    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))
    }
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port()?.read(buf)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port()?.flush()
    }
}

impl Port for SerialLink {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn discard_buffers(&mut self) -> Result<(), TransportError> {
        self.port()?.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn close(&mut self) {
        self.port = None;
    }
}
