use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::TargetInfo;
use crate::window::{OperationWindow, PageCount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[default]
    None,
    Read,
    Write,
    WriteUnprotect,
    ReadProtect,
    ReadUnprotect,
    EraseOnly,
    Crc,
}

impl Action {
    pub fn describe(&self) -> &'static str {
        match self {
            Action::None => "none",
            Action::Read => "memory read",
            Action::Write => "memory write",
            Action::WriteUnprotect => "write unprotect",
            Action::ReadProtect => "read protect",
            Action::ReadUnprotect => "read unprotect",
            Action::EraseOnly => "flash erase",
            Action::Crc => "memory crc",
        }
    }

    /// The bootloader resets the target on its own after acknowledging these.
    pub fn resets_target(&self) -> bool {
        matches!(
            self,
            Action::WriteUnprotect | Action::ReadProtect | Action::ReadUnprotect
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationEvent {
    ParserSelected {
        parser: &'static str,
    },

    PortOpenFailed {
        device: String,
        attempt: u32,
        attempts: u32,
        error: String,
    },
    PortOpened {
        device: String,
        description: String,
    },

    TargetIdentified {
        info: TargetInfo,
    },
    WindowResolved {
        window: OperationWindow,
    },

    ActionStart {
        action: Action,
    },
    Erase {
        first_page: u32,
        pages: PageCount,
    },
    /// Percent of the current read or write completed so far.
    Progress {
        action: Action,
        addr: u32,
        percent: f32,
    },
    VerifyRetry {
        addr: u32,
        attempt: u32,
        retries: u32,
        mismatch_at: u32,
    },
    Crc {
        start: u32,
        end: u32,
        crc: u32,
    },
    ActionDone {
        action: Action,
    },

    Resume {
        addr: u32,
        ok: bool,
    },
    Reset {
        ok: bool,
    },
    ExitSequence {
        ok: bool,
    },

    /// Emitted exactly once per session, last.
    Completed {
        ok: bool,
        message: Option<String>,
    },
}
