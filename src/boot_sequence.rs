use std::io;

use thiserror::Error;

use crate::port::Port;
use crate::protocol::{Bootloader, ProtocolError};

/// Separates the entry half of a boot sequence from its exit half.
pub const EXIT_DELIMITER: char = ':';

#[derive(Error, Debug)]
pub enum SequenceError {
    #[error("invalid boot sequence '{sequence}': {message}")]
    Invalid { sequence: String, message: String },

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Drives the pins (or commands) that move the target in and out of its
/// bootloader.
pub trait BootSequencer: Send {
    fn enter(&mut self, port: &mut dyn Port, sequence: Option<&str>) -> Result<(), SequenceError>;

    /// Leaves the bootloader by resetting the target.
    fn exit(
        &mut self,
        bootloader: &mut dyn Bootloader,
        port: &mut dyn Port,
        sequence: Option<&str>,
    ) -> Result<(), SequenceError>;

    /// Runs only the exit half of `sequence`.
    fn run_exit_sequence(
        &mut self,
        port: &mut dyn Port,
        sequence: &str,
    ) -> Result<(), SequenceError>;
}

pub fn has_exit_sequence(sequence: Option<&str>) -> bool {
    sequence.is_some_and(|s| s.contains(EXIT_DELIMITER))
}

/// For hosts that handle boot pins themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSequence;

impl BootSequencer for NoSequence {
    fn enter(
        &mut self,
        _port: &mut dyn Port,
        _sequence: Option<&str>,
    ) -> Result<(), SequenceError> {
        Ok(())
    }

    fn exit(
        &mut self,
        _bootloader: &mut dyn Bootloader,
        _port: &mut dyn Port,
        _sequence: Option<&str>,
    ) -> Result<(), SequenceError> {
        Ok(())
    }

    fn run_exit_sequence(
        &mut self,
        _port: &mut dyn Port,
        _sequence: &str,
    ) -> Result<(), SequenceError> {
        Ok(())
    }
}
