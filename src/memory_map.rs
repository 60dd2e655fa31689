use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A run of equally sized flash pages.
///
/// The last run of a table repeats for as long as needed to reach the end of
/// flash, so its `count` only matters for documentation purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRun {
    pub size: u32,
    pub count: u32,
}

impl PageRun {
    pub const fn new(size: u32, count: u32) -> Self {
        Self { size, count }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Flash,
    Ram,
    OptionBytes,
    SystemMemory,
    Unmapped,
}

/// Memory layout of one product as reported by the bootloader handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMap {
    pub ram_start: u32,
    pub ram_end: u32,
    pub flash_start: u32,
    pub flash_end: u32,
    /// Option bytes bounds; `option_end` is the last valid byte.
    pub option_start: u32,
    pub option_end: u32,
    pub sysmem_start: u32,
    pub sysmem_end: u32,
    pub pages: Vec<PageRun>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryMapError {
    #[error("{region} bounds are inverted: 0x{start:08X} > 0x{end:08X}")]
    InvertedRegion {
        region: &'static str,
        start: u32,
        end: u32,
    },

    #[error("flash page table is empty")]
    EmptyPageTable,

    #[error("flash page run {index} has a zero page size")]
    ZeroPageSize { index: usize },

    #[error("flash page table covers {covered} bytes, flash is {flash_size} bytes")]
    PageTableMismatch { covered: u64, flash_size: u32 },
}

impl MemoryMap {
    pub fn validate(&self) -> Result<(), MemoryMapError> {
        let regions = [
            ("RAM", self.ram_start, self.ram_end),
            ("flash", self.flash_start, self.flash_end),
            ("option bytes", self.option_start, self.option_end),
            ("system memory", self.sysmem_start, self.sysmem_end),
        ];
        for (region, start, end) in regions {
            if start > end {
                return Err(MemoryMapError::InvertedRegion { region, start, end });
            }
        }

        let last = self.pages.last().ok_or(MemoryMapError::EmptyPageTable)?;
        if let Some(index) = self.pages.iter().position(|r| r.size == 0) {
            return Err(MemoryMapError::ZeroPageSize { index });
        }

        let flash_size = self.flash_size();
        let explicit: u64 = self
            .pages
            .iter()
            .map(|r| u64::from(r.size) * u64::from(r.count))
            .sum();
        let remainder = u64::from(flash_size).checked_sub(explicit);
        match remainder {
            Some(rem) if rem % u64::from(last.size) == 0 => Ok(()),
            _ => Err(MemoryMapError::PageTableMismatch {
                covered: explicit,
                flash_size,
            }),
        }
    }

    pub fn flash_size(&self) -> u32 {
        self.flash_end - self.flash_start
    }

    pub fn is_in_flash(&self, addr: u32) -> bool {
        addr >= self.flash_start && addr < self.flash_end
    }

    pub fn is_in_ram(&self, addr: u32) -> bool {
        addr >= self.ram_start && addr < self.ram_end
    }

    pub fn is_in_option_bytes(&self, addr: u32) -> bool {
        addr >= self.option_start && addr <= self.option_end
    }

    pub fn is_in_sysmem(&self, addr: u32) -> bool {
        addr >= self.sysmem_start && addr < self.sysmem_end
    }

    pub fn region_of(&self, addr: u32) -> Region {
        if self.is_in_flash(addr) {
            Region::Flash
        } else if self.is_in_ram(addr) {
            Region::Ram
        } else if self.is_in_option_bytes(addr) {
            Region::OptionBytes
        } else if self.is_in_sysmem(addr) {
            Region::SystemMemory
        } else {
            Region::Unmapped
        }
    }

    /// Page containing `addr`, or 0 when `addr` is outside flash.
    pub fn page_floor(&self, addr: u32) -> u32 {
        if !self.is_in_flash(addr) {
            return 0;
        }
        let (page, _) = self.locate(u64::from(addr - self.flash_start));
        saturate(page)
    }

    /// First page starting at or after `addr`, or 0 when `addr` is outside
    /// `[flash_start, flash_end]`.
    pub fn page_ceil(&self, addr: u32) -> u32 {
        if addr < self.flash_start || addr > self.flash_end {
            return 0;
        }
        let (page, rest) = self.locate(u64::from(addr - self.flash_start));
        if rest > 0 {
            saturate(page + 1)
        } else {
            saturate(page)
        }
    }

    /// Lowest address of `page`.
    pub fn page_to_addr(&self, page: u32) -> u32 {
        let last = self.pages.len().saturating_sub(1);
        let mut remaining = u64::from(page);
        let mut addr = u64::from(self.flash_start);

        for (i, run) in self.pages.iter().enumerate() {
            let count = u64::from(run.count);
            if i < last && remaining >= count {
                addr += u64::from(run.size) * count;
                remaining -= count;
                continue;
            }
            addr += u64::from(run.size) * remaining;
            break;
        }

        saturate(addr)
    }

    /// Splits an offset from the flash base into a page index and the
    /// number of bytes past that page's start.
    fn locate(&self, mut offset: u64) -> (u64, u64) {
        let last = self.pages.len().saturating_sub(1);
        let mut page = 0u64;

        for (i, run) in self.pages.iter().enumerate() {
            let size = u64::from(run.size);
            let span = size * u64::from(run.count);
            if i < last && offset >= span {
                offset -= span;
                page += u64::from(run.count);
                continue;
            }
            let Some(whole) = offset.checked_div(size) else {
                break;
            };
            return (page + whole, offset - whole * size);
        }

        (page, offset)
    }
}

fn saturate(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}
