use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    boot_sequence::{BootSequencer, SequenceError},
    cancel::CancelToken,
    memory_map::{MemoryMap, MemoryMapError},
    operation::{Action, OperationEvent},
    parser::{ParserError, ParserFactory},
    port::{self, OpenRetry, PortOpener, PortOptions, TransportError},
    protocol::{BootloaderConnector, ProtocolError},
    session::Session,
    transfer,
    window::{self, OperationWindow, PageCount, Selector, WindowError},
};

pub const DEFAULT_VERIFY_RETRIES: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashOptions {
    pub port: PortOptions,

    /// Read back every written chunk and compare.
    pub verify: bool,
    /// Rewrites allowed per chunk when verification fails.
    pub retries: u32,

    /// Skip the erase that normally precedes a write.
    pub no_erase: bool,
    /// Skip the structured parser and treat the input as raw binary.
    pub force_binary: bool,
    /// Input is a stream rather than a file: its size is unknown and running
    /// dry ends the write cleanly.
    pub streamed: bool,

    /// Run the boot entry sequence and send the autobaud init byte.
    pub enter_bootloader: bool,
    /// Resume execution after a successful operation.
    pub execute: bool,
    /// Where to resume; defaults to the start of flash.
    pub exec_addr: Option<u32>,
    /// Reset the target when done.
    pub reset: bool,
    /// GPIO entry/exit sequence, e.g. "-rts,dtr:rts".
    pub boot_sequence: Option<String>,

    pub port_open_attempts: u32,
    pub port_open_delay_ms: u64,
    /// Wait before the first command, for bootloaders that start slowly.
    pub settle_delay_ms: u64,
}

impl Default for FlashOptions {
    fn default() -> Self {
        Self {
            port: PortOptions::default(),
            verify: false,
            retries: DEFAULT_VERIFY_RETRIES,
            no_erase: false,
            force_binary: false,
            streamed: false,
            enter_bootloader: true,
            execute: false,
            exec_addr: None,
            reset: false,
            boot_sequence: None,
            port_open_attempts: 3,
            port_open_delay_ms: 1000,
            settle_delay_ms: 0,
        }
    }
}

/// Immutable snapshot of one flashing job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashRequest {
    pub action: Action,
    /// Input for writes, output for reads. Unused by the other actions.
    pub path: PathBuf,
    #[serde(default)]
    pub selector: Selector,
    #[serde(default)]
    pub options: FlashOptions,
}

impl FlashRequest {
    pub fn new(action: Action, path: impl Into<PathBuf>) -> Self {
        Self {
            action,
            path: path.into(),
            selector: Selector::Whole,
            options: FlashOptions::default(),
        }
    }

    /// The one-click "program this firmware" job: write the whole file,
    /// then start it from the flash base.
    pub fn firmware_write(device: &str, path: impl Into<PathBuf>, verify: bool) -> Self {
        let mut request = Self::new(Action::Write, path);
        request.options.port.device = device.to_string();
        request.options.port.baud_rate = 230_400;
        request.options.verify = verify;
        request.options.execute = true;
        request.options.settle_delay_ms = 250;
        request
    }
}

/// External pieces a session talks to.
pub struct Collaborators {
    pub parsers: Box<dyn ParserFactory>,
    pub opener: Box<dyn PortOpener>,
    pub connector: Box<dyn BootloaderConnector>,
    pub sequencer: Box<dyn BootSequencer>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashErrorKind {
    Configuration,
    Parser,
    Transport,
    Protocol,
    Alignment,
    VerifyMismatch,
    Cancelled,
}

#[derive(Error, Debug)]
pub enum FlashError {
    #[error("can't execute \"{first}\" and \"{second}\" at the same time")]
    ConflictingActions {
        first: &'static str,
        second: &'static str,
    },

    #[error("invalid options: {message}")]
    InvalidOptions { message: String },

    #[error("invalid memory map for {device}: {source}")]
    InvalidMemoryMap {
        device: String,
        #[source]
        source: MemoryMapError,
    },

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error("{parser} parser failed to initialize")]
    ParserInit { parser: &'static str },

    #[error("no data parser available")]
    NoParser,

    #[error("{parser} parser can't open {path}: {source}")]
    ParserOpen {
        parser: &'static str,
        path: String,
        #[source]
        source: ParserError,
    },

    #[error("failed to read input at offset {offset}: {source}")]
    InputRead {
        offset: u32,
        #[source]
        source: ParserError,
    },

    #[error("input ended at offset {offset} of {size} bytes")]
    InputExhausted { offset: u32, size: u32 },

    #[error("failed to write data to file: {source}")]
    OutputWrite {
        #[source]
        source: ParserError,
    },

    #[error("failed to open port {device} after {attempts} attempts: {source}")]
    PortOpen {
        device: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("port error: {source}")]
    Port {
        #[source]
        source: TransportError,
    },

    #[error("failed to send boot enter sequence: {source}")]
    BootEntry {
        #[source]
        source: SequenceError,
    },

    #[error("failed to connect to bootloader: {source}")]
    Connect {
        #[source]
        source: ProtocolError,
    },

    #[error("bootloader not connected")]
    NotConnected,

    #[error("failed to read memory at 0x{addr:08X}, target write-protected?: {source}")]
    ReadMemory {
        addr: u32,
        #[source]
        source: ProtocolError,
    },

    #[error("failed to write memory at 0x{addr:08X}: {source}")]
    WriteMemory {
        addr: u32,
        #[source]
        source: ProtocolError,
    },

    #[error("failed to erase memory: {source}")]
    Erase {
        #[source]
        source: ProtocolError,
    },

    #[error("{op} failed: {source}")]
    Protection {
        op: &'static str,
        #[source]
        source: ProtocolError,
    },

    #[error("failed to read CRC: {source}")]
    Crc {
        #[source]
        source: ProtocolError,
    },

    #[error("0x{start:08X}..0x{end:08X} is not page aligned")]
    Unaligned { start: u32, end: u32 },

    #[error(
        "failed to verify at 0x{addr:08X} after {attempts} attempts, expected 0x{expected:02X} and found 0x{actual:02X}"
    )]
    VerifyMismatch {
        addr: u32,
        expected: u8,
        actual: u8,
        attempts: u32,
    },

    #[error("failed to start execution at 0x{addr:08X}: {source}")]
    Resume {
        addr: u32,
        #[source]
        source: ProtocolError,
    },

    #[error("reset failed: {source}")]
    Reset {
        #[source]
        source: SequenceError,
    },

    #[error("cancelled")]
    Cancelled,
}

impl FlashError {
    pub fn kind(&self) -> FlashErrorKind {
        match self {
            FlashError::ConflictingActions { .. }
            | FlashError::InvalidOptions { .. }
            | FlashError::InvalidMemoryMap { .. }
            | FlashError::Window(_) => FlashErrorKind::Configuration,
            FlashError::ParserInit { .. }
            | FlashError::NoParser
            | FlashError::ParserOpen { .. }
            | FlashError::InputRead { .. }
            | FlashError::InputExhausted { .. }
            | FlashError::OutputWrite { .. } => FlashErrorKind::Parser,
            FlashError::PortOpen { .. }
            | FlashError::Port { .. }
            | FlashError::BootEntry { .. } => FlashErrorKind::Transport,
            FlashError::Connect { .. }
            | FlashError::NotConnected
            | FlashError::ReadMemory { .. }
            | FlashError::WriteMemory { .. }
            | FlashError::Erase { .. }
            | FlashError::Protection { .. }
            | FlashError::Crc { .. }
            | FlashError::Resume { .. }
            | FlashError::Reset { .. } => FlashErrorKind::Protocol,
            FlashError::Unaligned { .. } => FlashErrorKind::Alignment,
            FlashError::VerifyMismatch { .. } => FlashErrorKind::VerifyMismatch,
            FlashError::Cancelled => FlashErrorKind::Cancelled,
        }
    }
}

/// Collapses the actions a user asked for into the single one to run.
///
/// Repeating the same action is fine; asking for two different ones is not.
pub fn select_action(requested: &[Action]) -> Result<Action, FlashError> {
    let mut selected = Action::None;
    for &action in requested {
        if action == Action::None || action == selected {
            continue;
        }
        if selected != Action::None {
            return Err(FlashError::ConflictingActions {
                first: selected.describe(),
                second: action.describe(),
            });
        }
        selected = action;
    }
    Ok(selected)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EraseRange {
    pub first_page: u32,
    pub pages: PageCount,
}

/// What a session would do once connected to a target with a given map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlashPlan {
    pub action: Action,
    pub window: OperationWindow,
    pub erase: Option<EraseRange>,
    /// Bytes per write command.
    pub write_chunk: u32,
    /// Bytes per read command.
    pub read_chunk: u32,
}

/// Resolves the window for `action` and checks it can be carried out,
/// without touching a device.
pub fn plan_operation(
    action: Action,
    selector: &Selector,
    map: &MemoryMap,
    opts: &FlashOptions,
) -> Result<FlashPlan, FlashError> {
    let window = window::resolve(selector, map)?;

    if action == Action::EraseOnly && !window.is_page_aligned(map) {
        return Err(FlashError::Unaligned {
            start: window.start,
            end: window.end,
        });
    }

    let range = EraseRange {
        first_page: window.first_page,
        pages: window.pages,
    };
    let erase = match action {
        Action::EraseOnly if !window.pages.is_empty() => Some(range),
        Action::Write if !opts.no_erase && window.erasable && !window.pages.is_empty() => {
            Some(range)
        }
        _ => None,
    };

    let write_chunk = transfer::write_chunk_size(&opts.port);
    let read_chunk = opts.port.rx_frame_max;
    if action == Action::Write && write_chunk == 0 {
        return Err(FlashError::InvalidOptions {
            message: format!(
                "tx frame of {} bytes leaves no room for data",
                opts.port.tx_frame_max
            ),
        });
    }
    let reads = action == Action::Read || (action == Action::Write && opts.verify);
    if reads && read_chunk == 0 {
        return Err(FlashError::InvalidOptions {
            message: "rx frame size must be nonzero".to_string(),
        });
    }

    Ok(FlashPlan {
        action,
        window,
        erase,
        write_chunk,
        read_chunk,
    })
}

/// Runs one complete session and always finalizes it.
///
/// Emits a single [`OperationEvent::Completed`] last, whatever happens.
#[tracing::instrument(
    skip_all,
    fields(action = %request.action, device = %request.options.port.device)
)]
pub fn run_session<F>(
    request: &FlashRequest,
    collaborators: Collaborators,
    cancel: &CancelToken,
    mut on_event: F,
) -> Result<(), FlashError>
where
    F: FnMut(OperationEvent),
{
    let Collaborators {
        parsers,
        mut opener,
        mut connector,
        sequencer,
    } = collaborators;

    let mut session = Session::new(&request.options, sequencer);
    let result = execute(
        &mut session,
        request,
        parsers.as_ref(),
        opener.as_mut(),
        connector.as_mut(),
        cancel,
        &mut on_event,
    );
    if let Err(e) = &result {
        tracing::warn!(error = %e, "operation failed");
    }
    session.finalize(result, &mut on_event)
}

fn execute<F>(
    session: &mut Session,
    request: &FlashRequest,
    parsers: &dyn ParserFactory,
    opener: &mut dyn PortOpener,
    connector: &mut dyn BootloaderConnector,
    cancel: &CancelToken,
    on_event: &mut F,
) -> Result<(), FlashError>
where
    F: FnMut(OperationEvent),
{
    let opts = &request.options;

    if opts.settle_delay_ms > 0 {
        std::thread::sleep(Duration::from_millis(opts.settle_delay_ms));
    }

    acquire_parser(session, request, parsers, on_event)?;
    cancel.check()?;

    let device = &opts.port.device;
    let retry = OpenRetry {
        attempts: opts.port_open_attempts.max(1),
        delay: Duration::from_millis(opts.port_open_delay_ms),
    };
    let port = port::open_with_retry(opener, &opts.port, retry, |attempt, e| {
        tracing::warn!(%device, attempt, error = %e, "failed to open port");
        on_event(OperationEvent::PortOpenFailed {
            device: device.clone(),
            attempt,
            attempts: retry.attempts,
            error: e.to_string(),
        });
    })
    .map_err(|(attempts, source)| FlashError::PortOpen {
        device: device.clone(),
        attempts,
        source,
    })?;

    let port = session.port.insert(port);
    let description = port.describe();
    tracing::info!(%device, %description, "port open");
    on_event(OperationEvent::PortOpened {
        device: device.clone(),
        description,
    });

    if opts.enter_bootloader {
        session
            .sequencer
            .enter(port.as_mut(), opts.boot_sequence.as_deref())
            .map_err(|source| FlashError::BootEntry { source })?;
    }
    port.discard_buffers()
        .map_err(|source| FlashError::Port { source })?;

    let bootloader = connector
        .connect(port.as_mut(), opts.enter_bootloader)
        .map_err(|source| FlashError::Connect { source })?;
    let info = session.bootloader.insert(bootloader).info().clone();

    info.memory
        .validate()
        .map_err(|source| FlashError::InvalidMemoryMap {
            device: info.name.clone(),
            source,
        })?;
    tracing::info!(
        version = info.bootloader_version,
        pid = info.product_id,
        name = %info.name,
        flash_kib = info.memory.flash_size() / 1024,
        "target identified"
    );
    on_event(OperationEvent::TargetIdentified { info: info.clone() });

    let plan = plan_operation(request.action, &request.selector, &info.memory, opts)?;
    session.window = Some(plan.window);
    tracing::debug!(window = ?plan.window, erase = ?plan.erase, "window resolved");
    on_event(OperationEvent::WindowResolved {
        window: plan.window,
    });

    dispatch(session, &plan, request, cancel, on_event)
}

fn acquire_parser<F>(
    session: &mut Session,
    request: &FlashRequest,
    parsers: &dyn ParserFactory,
    on_event: &mut F,
) -> Result<(), FlashError>
where
    F: FnMut(OperationEvent),
{
    let path = &request.path;
    let action = request.action;

    if action == Action::Write && !request.options.force_binary {
        let parser = parsers
            .structured()
            .ok_or(FlashError::ParserInit {
                parser: "structured",
            })?;
        let parser = session.parser.insert(parser);
        match parser.open(path, false) {
            Ok(()) => {
                on_event(OperationEvent::ParserSelected {
                    parser: parser.name(),
                });
                return Ok(());
            }
            Err(ParserError::InvalidFile) => {
                tracing::debug!(path = %path.display(), "not a structured file, using binary");
                if let Some(mut rejected) = session.parser.take() {
                    rejected.close();
                }
            }
            Err(source) => {
                return Err(FlashError::ParserOpen {
                    parser: parser.name(),
                    path: path.display().to_string(),
                    source,
                })
            }
        }
    }

    let parser = parsers
        .binary()
        .ok_or(FlashError::ParserInit { parser: "binary" })?;
    let parser = session.parser.insert(parser);
    // The read sink is opened by the read action itself, once the target answered.
    if action == Action::Write {
        parser
            .open(path, false)
            .map_err(|source| FlashError::ParserOpen {
                parser: parser.name(),
                path: path.display().to_string(),
                source,
            })?;
    }
    on_event(OperationEvent::ParserSelected {
        parser: parser.name(),
    });
    Ok(())
}

fn dispatch<F>(
    session: &mut Session,
    plan: &FlashPlan,
    request: &FlashRequest,
    cancel: &CancelToken,
    on_event: &mut F,
) -> Result<(), FlashError>
where
    F: FnMut(OperationEvent),
{
    let action = plan.action;
    if action == Action::None {
        return Ok(());
    }

    tracing::info!(%action, "starting");
    on_event(OperationEvent::ActionStart { action });

    let opts = &request.options;
    let (mut link, parser) = session.parts()?;
    match action {
        Action::Read => {
            let parser = parser.ok_or(FlashError::NoParser)?;
            parser
                .open(&request.path, true)
                .map_err(|source| FlashError::ParserOpen {
                    parser: parser.name(),
                    path: request.path.display().to_string(),
                    source,
                })?;
            transfer::read_window(&mut link, parser, plan, cancel, on_event)?;
        }
        Action::Write => {
            let parser = parser.ok_or(FlashError::NoParser)?;
            transfer::write_window(&mut link, parser, plan, opts, cancel, on_event)?;
        }
        Action::EraseOnly => {
            if let Some(range) = plan.erase {
                transfer::erase(&mut link, range, on_event)?;
            }
        }
        Action::WriteUnprotect | Action::ReadProtect | Action::ReadUnprotect => {
            link.protection(action)?;
        }
        Action::Crc => {
            let window = plan.window;
            let crc = link.crc(window.start, window.len())?;
            tracing::info!(start = window.start, end = window.end, crc, "crc");
            on_event(OperationEvent::Crc {
                start: window.start,
                end: window.end,
                crc,
            });
        }
        Action::None => {}
    }
    session.self_reset = action.resets_target();

    tracing::info!(%action, "done");
    on_event(OperationEvent::ActionDone { action });
    Ok(())
}
