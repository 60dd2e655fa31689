use serde::Serialize;

use crate::memory_map::{MemoryMap, PageRun};

/// Static description of a product the bootloader may report.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Device {
    pub product_id: u16,
    pub name: &'static str,
    pub ram: (u32, u32),
    pub flash: (u32, u32),
    pub option_bytes: (u32, u32),
    pub sysmem: (u32, u32),
    pub pages: &'static [PageRun],
}

impl Device {
    pub fn memory_map(&self) -> MemoryMap {
        MemoryMap {
            ram_start: self.ram.0,
            ram_end: self.ram.1,
            flash_start: self.flash.0,
            flash_end: self.flash.1,
            option_start: self.option_bytes.0,
            option_end: self.option_bytes.1,
            sysmem_start: self.sysmem.0,
            sysmem_end: self.sysmem.1,
            pages: self.pages.to_vec(),
        }
    }
}

const P_1K: &[PageRun] = &[PageRun::new(1024, 4)];
const P_2K: &[PageRun] = &[PageRun::new(2048, 2)];
const F4_SECTORS: &[PageRun] = &[
    PageRun::new(0x4000, 4),
    PageRun::new(0x1_0000, 1),
    PageRun::new(0x2_0000, 7),
];

pub const DEVICES: &[Device] = &[
    Device {
        product_id: 0x410,
        name: "STM32F10xxx Medium-density",
        ram: (0x2000_0200, 0x2000_5000),
        flash: (0x0800_0000, 0x0802_0000),
        option_bytes: (0x1FFF_F800, 0x1FFF_F80F),
        sysmem: (0x1FFF_F000, 0x1FFF_F800),
        pages: P_1K,
    },
    Device {
        product_id: 0x411,
        name: "STM32F2xxxx",
        ram: (0x2000_2000, 0x2002_0000),
        flash: (0x0800_0000, 0x0810_0000),
        option_bytes: (0x1FFF_C000, 0x1FFF_C00F),
        sysmem: (0x1FFF_0000, 0x1FFF_7800),
        pages: F4_SECTORS,
    },
    Device {
        product_id: 0x412,
        name: "STM32F10xxx Low-density",
        ram: (0x2000_0200, 0x2000_2800),
        flash: (0x0800_0000, 0x0800_8000),
        option_bytes: (0x1FFF_F800, 0x1FFF_F80F),
        sysmem: (0x1FFF_F000, 0x1FFF_F800),
        pages: P_1K,
    },
    Device {
        product_id: 0x413,
        name: "STM32F40xxx/41xxx",
        ram: (0x2000_3000, 0x2002_0000),
        flash: (0x0800_0000, 0x0810_0000),
        option_bytes: (0x1FFF_C000, 0x1FFF_C00F),
        sysmem: (0x1FFF_0000, 0x1FFF_7800),
        pages: F4_SECTORS,
    },
    Device {
        product_id: 0x414,
        name: "STM32F10xxx High-density",
        ram: (0x2000_0200, 0x2001_0000),
        flash: (0x0800_0000, 0x0808_0000),
        option_bytes: (0x1FFF_F800, 0x1FFF_F80F),
        sysmem: (0x1FFF_F000, 0x1FFF_F800),
        pages: P_2K,
    },
    Device {
        product_id: 0x420,
        name: "STM32F10xxx Medium-density VL",
        ram: (0x2000_0200, 0x2000_2000),
        flash: (0x0800_0000, 0x0802_0000),
        option_bytes: (0x1FFF_F800, 0x1FFF_F80F),
        sysmem: (0x1FFF_F000, 0x1FFF_F800),
        pages: P_1K,
    },
    Device {
        product_id: 0x440,
        name: "STM32F030x8/F05xxx",
        ram: (0x2000_0800, 0x2000_2000),
        flash: (0x0800_0000, 0x0801_0000),
        option_bytes: (0x1FFF_F800, 0x1FFF_F80F),
        sysmem: (0x1FFF_EC00, 0x1FFF_F800),
        pages: P_1K,
    },
];

pub fn lookup(product_id: u16) -> Option<&'static Device> {
    DEVICES.iter().find(|d| d.product_id == product_id)
}
