//! Recording collaborators for session tests.

use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::api::Collaborators;
use crate::boot_sequence::{BootSequencer, SequenceError};
use crate::memory_map::MemoryMap;
use crate::parser::{DataParser, ParserError, ParserFactory};
use crate::port::{Port, PortOpener, PortOptions, TransportError};
use crate::protocol::{Bootloader, BootloaderConnector, ProtocolError, TargetInfo};
use crate::window::PageCount;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ParserOpen { parser: &'static str, for_write: bool },
    ParserClose,
    Output { len: usize },
    PortOpen,
    PortClose,
    Connect { send_init: bool },
    Read { addr: u32, len: usize },
    Write { addr: u32, len: usize },
    Erase { first_page: u32, pages: PageCount },
    Protection,
    Crc { addr: u32, len: u32 },
    Go { addr: u32 },
    BootloaderClose,
    SequencerEnter,
    SequencerExit,
    SequencerExitOnly,
}

pub type Log = Arc<Mutex<Vec<Call>>>;

fn push(log: &Log, call: Call) {
    log.lock().unwrap().push(call);
}

#[derive(Debug, Clone)]
pub struct MockSetup {
    map: MemoryMap,
    input: Vec<u8>,
    declared_size: Option<u32>,
    missing_input: bool,
    structured_rejects: bool,
    port_failures: u32,
    corrupt_reads: usize,
    fail_write_at: Option<u32>,
    fail_protection: bool,
    fail_crc: bool,
    fail_go: bool,
    fail_exit: bool,
    fail_connect: bool,
}

impl MockSetup {
    pub fn new(map: MemoryMap) -> Self {
        Self {
            map,
            input: Vec::new(),
            declared_size: None,
            missing_input: false,
            structured_rejects: false,
            port_failures: 0,
            corrupt_reads: 0,
            fail_write_at: None,
            fail_protection: false,
            fail_crc: false,
            fail_go: false,
            fail_exit: false,
            fail_connect: false,
        }
    }

    pub fn input(mut self, data: Vec<u8>) -> Self {
        self.input = data;
        self
    }

    /// Parsers report `size` bytes whatever the input holds.
    pub fn declared_size(mut self, size: u32) -> Self {
        self.declared_size = Some(size);
        self
    }

    pub fn missing_input(mut self) -> Self {
        self.missing_input = true;
        self
    }

    /// The structured parser reports the input as not its format.
    pub fn structured_rejects(mut self) -> Self {
        self.structured_rejects = true;
        self
    }

    pub fn port_failures(mut self, n: u32) -> Self {
        self.port_failures = n;
        self
    }

    /// Flips the first byte of the next `n` memory reads.
    pub fn corrupt_reads(mut self, n: usize) -> Self {
        self.corrupt_reads = n;
        self
    }

    pub fn fail_write_at(mut self, addr: u32) -> Self {
        self.fail_write_at = Some(addr);
        self
    }

    pub fn fail_protection(mut self) -> Self {
        self.fail_protection = true;
        self
    }

    pub fn fail_crc(mut self) -> Self {
        self.fail_crc = true;
        self
    }

    pub fn fail_go(mut self) -> Self {
        self.fail_go = true;
        self
    }

    /// Both the reset and the exit-only sequence fail.
    pub fn fail_exit(mut self) -> Self {
        self.fail_exit = true;
        self
    }

    pub fn fail_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn build(self) -> (Collaborators, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let setup = Arc::new(self);
        let collaborators = Collaborators {
            parsers: Box::new(MockParsers {
                setup: setup.clone(),
                log: log.clone(),
            }),
            opener: Box::new(MockOpener {
                failures_left: setup.port_failures,
                log: log.clone(),
            }),
            connector: Box::new(MockConnector {
                setup: setup.clone(),
                log: log.clone(),
            }),
            sequencer: Box::new(MockSequencer {
                fail: setup.fail_exit,
                log: log.clone(),
            }),
        };
        (collaborators, log)
    }
}

struct MockParsers {
    setup: Arc<MockSetup>,
    log: Log,
}

impl ParserFactory for MockParsers {
    fn structured(&self) -> Option<Box<dyn DataParser>> {
        Some(Box::new(MockParser::new("structured", &self.setup, &self.log)))
    }

    fn binary(&self) -> Option<Box<dyn DataParser>> {
        Some(Box::new(MockParser::new("binary", &self.setup, &self.log)))
    }
}

struct MockParser {
    name: &'static str,
    data: Vec<u8>,
    size: u32,
    pos: usize,
    missing: bool,
    rejects: bool,
    log: Log,
}

impl MockParser {
    fn new(name: &'static str, setup: &MockSetup, log: &Log) -> Self {
        Self {
            name,
            data: setup.input.clone(),
            size: setup
                .declared_size
                .unwrap_or(setup.input.len() as u32),
            pos: 0,
            missing: setup.missing_input,
            rejects: name == "structured" && setup.structured_rejects,
            log: log.clone(),
        }
    }
}

impl DataParser for MockParser {
    fn name(&self) -> &'static str {
        self.name
    }

    fn open(&mut self, _path: &Path, for_write: bool) -> Result<(), ParserError> {
        push(
            &self.log,
            Call::ParserOpen {
                parser: self.name,
                for_write,
            },
        );
        if self.missing && !for_write {
            return Err(ParserError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "no such file",
            )));
        }
        if self.rejects {
            return Err(ParserError::InvalidFile);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ParserError> {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ParserError> {
        push(&self.log, Call::Output { len: data.len() });
        Ok(())
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn close(&mut self) {
        push(&self.log, Call::ParserClose);
    }
}

pub struct MockPort {
    log: Log,
}

impl MockPort {
    pub fn new(log: &Log) -> Self {
        Self { log: log.clone() }
    }
}

impl Read for MockPort {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn describe(&self) -> String {
        "57600 8E1".to_string()
    }

    fn discard_buffers(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&mut self) {
        push(&self.log, Call::PortClose);
    }
}

struct MockOpener {
    failures_left: u32,
    log: Log,
}

impl PortOpener for MockOpener {
    fn open(&mut self, _opts: &PortOptions) -> Result<Box<dyn Port>, TransportError> {
        push(&self.log, Call::PortOpen);
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "port busy",
            )));
        }
        Ok(Box::new(MockPort::new(&self.log)))
    }
}

struct MockConnector {
    setup: Arc<MockSetup>,
    log: Log,
}

impl BootloaderConnector for MockConnector {
    fn connect(
        &mut self,
        _port: &mut dyn Port,
        send_init: bool,
    ) -> Result<Box<dyn Bootloader>, ProtocolError> {
        push(&self.log, Call::Connect { send_init });
        if self.setup.fail_connect {
            return Err(ProtocolError::Timeout);
        }
        let map = self.setup.map.clone();
        Ok(Box::new(MockBootloader {
            memory: vec![0xFF; map.flash_size() as usize],
            info: TargetInfo {
                bootloader_version: 0x22,
                option_bytes: None,
                product_id: 0x410,
                name: "mock target".to_string(),
                memory: map,
            },
            setup: self.setup.clone(),
            corrupt_reads: self.setup.corrupt_reads,
            log: self.log.clone(),
        }))
    }
}

struct MockBootloader {
    info: TargetInfo,
    memory: Vec<u8>,
    setup: Arc<MockSetup>,
    corrupt_reads: usize,
    log: Log,
}

impl MockBootloader {
    fn flash_offset(&self, addr: u32) -> Option<usize> {
        let map = &self.info.memory;
        map.is_in_flash(addr)
            .then(|| (addr - map.flash_start) as usize)
    }
}

impl Bootloader for MockBootloader {
    fn info(&self) -> &TargetInfo {
        &self.info
    }

    fn read_memory(
        &mut self,
        _port: &mut dyn Port,
        addr: u32,
        buf: &mut [u8],
    ) -> Result<(), ProtocolError> {
        push(&self.log, Call::Read { addr, len: buf.len() });
        match self.flash_offset(addr) {
            Some(off) => buf.copy_from_slice(&self.memory[off..off + buf.len()]),
            None => buf.fill(0),
        }
        if self.corrupt_reads > 0 && !buf.is_empty() {
            self.corrupt_reads -= 1;
            buf[0] ^= 0xFF;
        }
        Ok(())
    }

    fn write_memory(
        &mut self,
        _port: &mut dyn Port,
        addr: u32,
        data: &[u8],
    ) -> Result<(), ProtocolError> {
        push(&self.log, Call::Write { addr, len: data.len() });
        if self.setup.fail_write_at == Some(addr) {
            return Err(ProtocolError::Nack);
        }
        if let Some(off) = self.flash_offset(addr) {
            self.memory[off..off + data.len()].copy_from_slice(data);
        }
        Ok(())
    }

    fn erase_memory(
        &mut self,
        _port: &mut dyn Port,
        first_page: u32,
        pages: PageCount,
    ) -> Result<(), ProtocolError> {
        push(&self.log, Call::Erase { first_page, pages });
        Ok(())
    }

    fn read_protect(&mut self, _port: &mut dyn Port) -> Result<(), ProtocolError> {
        self.protection()
    }

    fn read_unprotect(&mut self, _port: &mut dyn Port) -> Result<(), ProtocolError> {
        self.protection()
    }

    fn write_unprotect(&mut self, _port: &mut dyn Port) -> Result<(), ProtocolError> {
        self.protection()
    }

    fn crc(&mut self, _port: &mut dyn Port, addr: u32, len: u32) -> Result<u32, ProtocolError> {
        push(&self.log, Call::Crc { addr, len });
        if self.setup.fail_crc {
            return Err(ProtocolError::Nack);
        }
        Ok(0xDEAD_BEEF)
    }

    fn go(&mut self, _port: &mut dyn Port, addr: u32) -> Result<(), ProtocolError> {
        push(&self.log, Call::Go { addr });
        if self.setup.fail_go {
            return Err(ProtocolError::Nack);
        }
        Ok(())
    }

    fn close(&mut self) {
        push(&self.log, Call::BootloaderClose);
    }
}

impl MockBootloader {
    fn protection(&mut self) -> Result<(), ProtocolError> {
        push(&self.log, Call::Protection);
        if self.setup.fail_protection {
            return Err(ProtocolError::Nack);
        }
        Ok(())
    }
}

struct MockSequencer {
    fail: bool,
    log: Log,
}

impl MockSequencer {
    fn outcome(&self) -> Result<(), SequenceError> {
        if self.fail {
            return Err(SequenceError::Invalid {
                sequence: String::new(),
                message: "pin stuck".to_string(),
            });
        }
        Ok(())
    }
}

impl BootSequencer for MockSequencer {
    fn enter(
        &mut self,
        _port: &mut dyn Port,
        _sequence: Option<&str>,
    ) -> Result<(), SequenceError> {
        push(&self.log, Call::SequencerEnter);
        Ok(())
    }

    fn exit(
        &mut self,
        _bootloader: &mut dyn Bootloader,
        _port: &mut dyn Port,
        _sequence: Option<&str>,
    ) -> Result<(), SequenceError> {
        push(&self.log, Call::SequencerExit);
        self.outcome()
    }

    fn run_exit_sequence(
        &mut self,
        _port: &mut dyn Port,
        _sequence: &str,
    ) -> Result<(), SequenceError> {
        push(&self.log, Call::SequencerExitOnly);
        self.outcome()
    }
}
