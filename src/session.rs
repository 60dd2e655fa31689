use crate::api::{FlashError, FlashOptions};
use crate::boot_sequence::BootSequencer;
use crate::operation::Action;
use crate::parser::DataParser;
use crate::port::Port;
use crate::protocol::Bootloader;
use crate::window::{OperationWindow, PageCount};

/// Everything one flashing session owns.
///
/// Handles are `None` until acquired. They are released by
/// [`Session::finalize`], or by `Drop` if the session is
/// abandoned while unwinding.
pub struct Session {
    pub(crate) parser: Option<Box<dyn DataParser>>,
    pub(crate) bootloader: Option<Box<dyn Bootloader>>,
    pub(crate) port: Option<Box<dyn Port>>,
    pub(crate) sequencer: Box<dyn BootSequencer>,

    pub(crate) execute: bool,
    pub(crate) exec_addr: Option<u32>,
    pub(crate) reset: bool,
    pub(crate) boot_sequence: Option<String>,

    pub(crate) window: Option<OperationWindow>,
    /// Set once the target acknowledged a command after which it resets itself.
    pub(crate) self_reset: bool,
}

impl Session {
    pub(crate) fn new(opts: &FlashOptions, sequencer: Box<dyn BootSequencer>) -> Self {
        Self {
            parser: None,
            bootloader: None,
            port: None,
            sequencer,
            execute: opts.execute,
            exec_addr: opts.exec_addr,
            reset: opts.reset,
            boot_sequence: opts.boot_sequence.clone(),
            window: None,
            self_reset: false,
        }
    }

    /// Splits the session into the device link and the parser.
    pub(crate) fn parts(
        &mut self,
    ) -> Result<(Link<'_>, Option<&mut (dyn DataParser + 'static)>), FlashError> {
        let parser = self.parser.as_deref_mut();
        let link = match (self.bootloader.as_deref_mut(), self.port.as_deref_mut()) {
            (Some(bootloader), Some(port)) => Link { bootloader, port },
            _ => return Err(FlashError::NotConnected),
        };
        Ok((link, parser))
    }

    pub(crate) fn release(&mut self) {
        if let Some(mut parser) = self.parser.take() {
            tracing::debug!(parser = parser.name(), "closing parser");
            parser.close();
        }
        if let Some(mut bootloader) = self.bootloader.take() {
            tracing::debug!("closing bootloader session");
            bootloader.close();
        }
        if let Some(mut port) = self.port.take() {
            tracing::debug!("closing port");
            port.close();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}

/// Bootloader plus the port it talks through, with protocol failures mapped
/// onto [`FlashError`].
pub(crate) struct Link<'a> {
    bootloader: &'a mut dyn Bootloader,
    port: &'a mut dyn Port,
}

impl Link<'_> {
    pub(crate) fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.bootloader
            .read_memory(&mut *self.port, addr, buf)
            .map_err(|source| FlashError::ReadMemory { addr, source })
    }

    pub(crate) fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        self.bootloader
            .write_memory(&mut *self.port, addr, data)
            .map_err(|source| FlashError::WriteMemory { addr, source })
    }

    pub(crate) fn erase(&mut self, first_page: u32, pages: PageCount) -> Result<(), FlashError> {
        self.bootloader
            .erase_memory(&mut *self.port, first_page, pages)
            .map_err(|source| FlashError::Erase { source })
    }

    pub(crate) fn crc(&mut self, addr: u32, len: u32) -> Result<u32, FlashError> {
        self.bootloader
            .crc(&mut *self.port, addr, len)
            .map_err(|source| FlashError::Crc { source })
    }

    /// Runs one of the commands after which the target resets itself.
    pub(crate) fn protection(&mut self, action: Action) -> Result<(), FlashError> {
        let port = &mut *self.port;
        let (op, r) = match action {
            Action::WriteUnprotect => ("write-unprotect", self.bootloader.write_unprotect(port)),
            Action::ReadProtect => ("read-protect", self.bootloader.read_protect(port)),
            Action::ReadUnprotect => ("read-unprotect", self.bootloader.read_unprotect(port)),
            _ => return Ok(()),
        };
        r.map_err(|source| FlashError::Protection { op, source })
    }
}
