//! Chunked memory transfers between a parser and the target.

use crate::api::{EraseRange, FlashError, FlashOptions, FlashPlan};
use crate::cancel::CancelToken;
use crate::operation::{Action, OperationEvent};
use crate::parser::DataParser;
use crate::port::PortOptions;
use crate::session::Link;

/// Length byte plus checksum in every write frame.
pub const WRITE_FRAME_OVERHEAD: u32 = 2;

/// Largest write payload that fits both frame limits, kept word aligned.
pub fn write_chunk_size(port: &PortOptions) -> u32 {
    port.tx_frame_max
        .saturating_sub(WRITE_FRAME_OVERHEAD)
        .min(port.rx_frame_max)
        & !3
}

/// Cursor over one read or write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferState {
    pub addr: u32,
    pub end: u32,
    /// Bytes moved so far.
    pub offset: u32,
    /// Bytes expected in total.
    pub total: u32,
    pub chunk: u32,
    pub verify: bool,
    pub retries: u32,
    /// Consecutive verify failures of the chunk in flight.
    pub failures: u32,
}

impl TransferState {
    pub fn new(start: u32, end: u32, total: u32, chunk: u32) -> Self {
        Self {
            addr: start,
            end,
            offset: 0,
            total,
            chunk,
            verify: false,
            retries: 0,
            failures: 0,
        }
    }

    pub fn with_verify(mut self, retries: u32) -> Self {
        self.verify = true;
        self.retries = retries;
        self
    }

    /// Size of the next chunk, or `None` once the window or the payload is
    /// used up.
    pub fn next_chunk(&self) -> Option<u32> {
        if self.addr >= self.end || self.offset >= self.total || self.chunk == 0 {
            return None;
        }
        Some(
            self.chunk
                .min(self.end - self.addr)
                .min(self.total - self.offset),
        )
    }

    pub fn advance(&mut self, len: u32) {
        self.addr = self.addr.saturating_add(len);
        self.offset = self.offset.saturating_add(len);
    }

    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            return 100.0;
        }
        self.offset as f32 * 100.0 / self.total as f32
    }
}

pub(crate) fn erase<F>(
    link: &mut Link<'_>,
    range: EraseRange,
    on_event: &mut F,
) -> Result<(), FlashError>
where
    F: FnMut(OperationEvent),
{
    tracing::info!(first_page = range.first_page, pages = ?range.pages, "erasing");
    on_event(OperationEvent::Erase {
        first_page: range.first_page,
        pages: range.pages,
    });
    link.erase(range.first_page, range.pages)
}

/// Erases (when planned) and writes the parser's payload into the window.
pub(crate) fn write_window<F>(
    link: &mut Link<'_>,
    parser: &mut dyn DataParser,
    plan: &FlashPlan,
    opts: &FlashOptions,
    cancel: &CancelToken,
    on_event: &mut F,
) -> Result<(), FlashError>
where
    F: FnMut(OperationEvent),
{
    if let Some(range) = plan.erase {
        erase(link, range, on_event)?;
    }

    let window = plan.window;
    let total = if opts.streamed {
        window.len()
    } else {
        parser.size()
    };
    let mut state = TransferState::new(window.start, window.end, total, plan.write_chunk);
    if opts.verify {
        state = state.with_verify(opts.retries);
    }
    tracing::debug!(total, chunk = plan.write_chunk, verify = opts.verify, "writing");

    let mut buf = vec![0u8; plan.write_chunk as usize];
    while let Some(len) = state.next_chunk() {
        cancel.check()?;

        let buf = &mut buf[..len as usize];
        let n = parser.read(buf).map_err(|source| FlashError::InputRead {
            offset: state.offset,
            source,
        })?;
        if n == 0 {
            if opts.streamed {
                tracing::debug!(offset = state.offset, "input stream ended");
                break;
            }
            return Err(FlashError::InputExhausted {
                offset: state.offset,
                size: total,
            });
        }

        let data = &buf[..n.min(len as usize)];
        write_verified(link, &mut state, data, plan.read_chunk, on_event)?;
        state.advance(data.len() as u32);

        on_event(OperationEvent::Progress {
            action: Action::Write,
            addr: state.addr,
            percent: state.percent(),
        });
    }
    Ok(())
}

/// Writes one chunk at the cursor and, when verifying, reads it back and
/// rewrites it until it matches or the retry budget runs out.
pub(crate) fn write_verified<F>(
    link: &mut Link<'_>,
    state: &mut TransferState,
    data: &[u8],
    read_chunk: u32,
    on_event: &mut F,
) -> Result<(), FlashError>
where
    F: FnMut(OperationEvent),
{
    let mut readback = vec![0u8; data.len()];
    loop {
        link.write(state.addr, data)?;
        if !state.verify {
            return Ok(());
        }

        let mut addr = state.addr;
        for part in readback.chunks_mut(read_chunk.max(1) as usize) {
            link.read(addr, part)?;
            addr = addr.saturating_add(part.len() as u32);
        }

        let Some(at) = data.iter().zip(&readback).position(|(a, b)| a != b) else {
            state.failures = 0;
            return Ok(());
        };

        let mismatch_at = state.addr.saturating_add(at as u32);
        if state.failures >= state.retries {
            return Err(FlashError::VerifyMismatch {
                addr: mismatch_at,
                expected: data[at],
                actual: readback[at],
                attempts: state.failures + 1,
            });
        }
        state.failures += 1;
        tracing::warn!(
            addr = state.addr,
            mismatch_at,
            attempt = state.failures,
            retries = state.retries,
            "verify failed, rewriting chunk"
        );
        on_event(OperationEvent::VerifyRetry {
            addr: state.addr,
            attempt: state.failures,
            retries: state.retries,
            mismatch_at,
        });
    }
}

/// Reads the window into the parser's output.
pub(crate) fn read_window<F>(
    link: &mut Link<'_>,
    parser: &mut dyn DataParser,
    plan: &FlashPlan,
    cancel: &CancelToken,
    on_event: &mut F,
) -> Result<(), FlashError>
where
    F: FnMut(OperationEvent),
{
    let window = plan.window;
    let mut state = TransferState::new(window.start, window.end, window.len(), plan.read_chunk);
    let mut buf = vec![0u8; plan.read_chunk as usize];

    while let Some(len) = state.next_chunk() {
        cancel.check()?;

        let buf = &mut buf[..len as usize];
        link.read(state.addr, buf)?;
        parser
            .write(buf)
            .map_err(|source| FlashError::OutputWrite { source })?;
        state.advance(len);

        on_event(OperationEvent::Progress {
            action: Action::Read,
            addr: state.addr,
            percent: state.percent(),
        });
    }
    Ok(())
}
