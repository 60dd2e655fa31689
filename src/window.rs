use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory_map::{MemoryMap, Region};

/// Size of the fallback window for an address outside every known region
/// when no length was given.
pub const UNMAPPED_DEFAULT_LEN: u32 = 4;

/// Number of pages an operation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageCount {
    /// Erase the entire flash with a single global erase command.
    MassErase,
    Pages(u32),
}

impl PageCount {
    pub fn is_empty(&self) -> bool {
        matches!(self, PageCount::Pages(0))
    }
}

/// How the user picked the memory to operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selector {
    /// The whole flash.
    #[default]
    Whole,
    Address { start: u32, length: Option<u32> },
    Pages { start_page: u32, count: Option<u32> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperationWindow {
    pub start: u32,
    /// Exclusive.
    pub end: u32,
    pub first_page: u32,
    pub pages: PageCount,
    pub region: Region,
    /// False for windows outside flash; writes there never erase first.
    pub erasable: bool,
}

impl OperationWindow {
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Whether the window sits exactly on page boundaries. A mass erase is
    /// always considered aligned.
    pub fn is_page_aligned(&self, map: &MemoryMap) -> bool {
        match self.pages {
            PageCount::MassErase => true,
            PageCount::Pages(n) => {
                self.start == map.page_to_addr(self.first_page)
                    && self.end == map.page_to_addr(self.first_page.saturating_add(n))
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("start page {page} at 0x{addr:08X} is beyond the end of flash (0x{flash_end:08X})")]
    PageBeyondFlash { page: u32, addr: u32, flash_end: u32 },
}

pub fn resolve(selector: &Selector, map: &MemoryMap) -> Result<OperationWindow, WindowError> {
    match *selector {
        Selector::Whole => Ok(OperationWindow {
            start: map.flash_start,
            end: map.flash_end,
            first_page: 0,
            pages: PageCount::MassErase,
            region: Region::Flash,
            erasable: true,
        }),
        Selector::Address { start, length } => Ok(resolve_address(start, length, map)),
        Selector::Pages { start_page, count } => resolve_pages(start_page, count, map),
    }
}

fn resolve_address(start: u32, length: Option<u32>, map: &MemoryMap) -> OperationWindow {
    let region = map.region_of(start);
    let mut end = match region {
        Region::Flash => map.flash_end,
        Region::Ram => map.ram_end,
        Region::OptionBytes => map.option_end.saturating_add(1),
        Region::SystemMemory => map.sysmem_end,
        Region::Unmapped => start.saturating_add(length.unwrap_or(UNMAPPED_DEFAULT_LEN)),
    };
    if let Some(len) = length {
        end = end.min(start.saturating_add(len));
    }

    let first_page = map.page_floor(start);
    OperationWindow {
        start,
        end,
        first_page,
        pages: page_count(first_page, end, map),
        region,
        erasable: region == Region::Flash,
    }
}

fn resolve_pages(
    start_page: u32,
    count: Option<u32>,
    map: &MemoryMap,
) -> Result<OperationWindow, WindowError> {
    let start = map.page_to_addr(start_page);
    if start > map.flash_end {
        return Err(WindowError::PageBeyondFlash {
            page: start_page,
            addr: start,
            flash_end: map.flash_end,
        });
    }

    let (end, pages) = match count {
        Some(n) => {
            let end = map.page_to_addr(start_page.saturating_add(n)).min(map.flash_end);
            (end, PageCount::Pages(n))
        }
        None => (map.flash_end, page_count(start_page, map.flash_end, map)),
    };

    let pages = if start_page == 0 && end == map.flash_end {
        PageCount::MassErase
    } else {
        pages
    };

    Ok(OperationWindow {
        start,
        end,
        first_page: start_page,
        pages,
        region: Region::Flash,
        erasable: true,
    })
}

fn page_count(first_page: u32, end: u32, map: &MemoryMap) -> PageCount {
    if first_page == 0 && end == map.flash_end {
        PageCount::MassErase
    } else {
        PageCount::Pages(map.page_ceil(end).saturating_sub(first_page))
    }
}
