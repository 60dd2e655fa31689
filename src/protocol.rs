use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::memory_map::MemoryMap;
use crate::port::Port;
use crate::window::PageCount;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("bootloader replied NACK")]
    Nack,

    #[error("no reply from bootloader")]
    Timeout,

    #[error("command not supported by this bootloader: {command}")]
    Unsupported { command: &'static str },

    #[error("unknown product id 0x{pid:04X}")]
    UnknownDevice { pid: u16 },

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

/// What the bootloader handshake reported about the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetInfo {
    pub bootloader_version: u8,
    /// Extra option bytes, reported only by some transports.
    pub option_bytes: Option<[u8; 2]>,
    pub product_id: u16,
    pub name: String,
    pub memory: MemoryMap,
}

/// An established bootloader session.
///
/// The driver does not own the port. The session lends it on every call so
/// that port, driver and parser can each be released independently.
pub trait Bootloader: Send {
    fn info(&self) -> &TargetInfo;

    fn read_memory(
        &mut self,
        port: &mut dyn Port,
        addr: u32,
        buf: &mut [u8],
    ) -> Result<(), ProtocolError>;

    fn write_memory(&mut self, port: &mut dyn Port, addr: u32, data: &[u8])
        -> Result<(), ProtocolError>;

    fn erase_memory(
        &mut self,
        port: &mut dyn Port,
        first_page: u32,
        pages: PageCount,
    ) -> Result<(), ProtocolError>;

    fn read_protect(&mut self, port: &mut dyn Port) -> Result<(), ProtocolError>;

    fn read_unprotect(&mut self, port: &mut dyn Port) -> Result<(), ProtocolError>;

    fn write_unprotect(&mut self, port: &mut dyn Port) -> Result<(), ProtocolError>;

    fn crc(&mut self, port: &mut dyn Port, addr: u32, len: u32) -> Result<u32, ProtocolError>;

    /// Jumps to `addr` and leaves the bootloader.
    fn go(&mut self, port: &mut dyn Port, addr: u32) -> Result<(), ProtocolError>;

    fn close(&mut self) {}
}

pub trait BootloaderConnector: Send {
    /// Runs the handshake. `send_init` sends the autobaud init byte first.
    fn connect(
        &mut self,
        port: &mut dyn Port,
        send_init: bool,
    ) -> Result<Box<dyn Bootloader>, ProtocolError>;
}
