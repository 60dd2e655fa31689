use std::io;
use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    /// The file is not in this parser's format; the caller may try another.
    #[error("invalid file for this parser")]
    InvalidFile,

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("invalid data: {message}")]
    InvalidData { message: String },

    #[error("not enough memory")]
    NoMemory,
}

/// Reads firmware from, or writes memory dumps to, a file or stream.
pub trait DataParser: Send {
    fn name(&self) -> &'static str;

    fn open(&mut self, path: &Path, for_write: bool) -> Result<(), ParserError>;

    /// Fills at most `buf.len()` bytes and returns how many were produced.
    /// Zero means the end of a streamed source.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ParserError>;

    fn write(&mut self, data: &[u8]) -> Result<(), ParserError>;

    /// Payload size of an opened input, in bytes.
    fn size(&self) -> u32;

    fn close(&mut self) {}
}

/// Creates parser instances. `None` means the parser failed to initialize.
pub trait ParserFactory: Send {
    /// Structured (Intel HEX style) parser.
    fn structured(&self) -> Option<Box<dyn DataParser>>;

    /// Raw binary parser.
    fn binary(&self) -> Option<Box<dyn DataParser>>;
}
