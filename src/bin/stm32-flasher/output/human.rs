use stm32_flasher::{
    devices::Device,
    memory_map::Region,
    window::{PageCount, Selector},
};

use crate::output::{Event, PlanReport, Reporter};

#[derive(Default)]
pub struct HumanOutput;

impl HumanOutput {
    pub fn new() -> Self {
        Self
    }
}

impl Reporter for HumanOutput {
    fn emit(&mut self, event: Event) {
        match event {
            Event::Devices(devices) => {
                for d in devices {
                    println!("{}", device_line(d));
                }
            }
            Event::Plan(report) => {
                for line in plan_lines(&report) {
                    println!("{line}");
                }
            }
            Event::Error { message, .. } => eprintln!("error: {message}"),
        }
    }

    fn finish(&mut self) {}
}

fn region_name(region: Region) -> &'static str {
    match region {
        Region::Flash => "flash",
        Region::Ram => "RAM",
        Region::OptionBytes => "option bytes",
        Region::SystemMemory => "system memory",
        Region::Unmapped => "unmapped",
    }
}

fn pages_text(first_page: u32, pages: PageCount) -> String {
    match pages {
        PageCount::MassErase => "mass erase".to_string(),
        PageCount::Pages(n) => format!("pages {first_page}..{}", first_page.saturating_add(n)),
    }
}

pub(crate) fn device_line(d: &Device) -> String {
    let first = d.pages.first().map(|r| r.size).unwrap_or(0);
    format!(
        "0x{:04X} {:<40} flash {:>5} KiB  RAM {:>4} KiB  first page {} B",
        d.product_id,
        d.name,
        (d.flash.1 - d.flash.0) / 1024,
        d.ram.1.saturating_sub(0x2000_0000) / 1024,
        first
    )
}

pub(crate) fn plan_lines(report: &PlanReport) -> Vec<String> {
    let plan = &report.plan;
    let w = &plan.window;

    let selector = match report.selector {
        Selector::Whole => "whole flash".to_string(),
        Selector::Address { start, length } => match length {
            Some(len) => format!("address 0x{start:08X}, {len} bytes"),
            None => format!("address 0x{start:08X}"),
        },
        Selector::Pages { start_page, count } => match count {
            Some(n) => format!("page {start_page}, {n} pages"),
            None => format!("page {start_page} to end of flash"),
        },
    };

    let erase = match plan.erase {
        Some(e) => pages_text(e.first_page, e.pages),
        None => "none".to_string(),
    };

    vec![
        format!(
            "Device       : 0x{:04X} ({})",
            report.device.product_id, report.device.name
        ),
        format!("Action       : {}", plan.action),
        format!("Selector     : {selector}"),
        format!(
            "Window       : 0x{:08X}..0x{:08X} ({} bytes, {})",
            w.start,
            w.end,
            w.len(),
            region_name(w.region)
        ),
        format!("Pages        : {}", pages_text(w.first_page, w.pages)),
        format!("Erase        : {erase}"),
        format!(
            "Chunks       : write {} bytes, read {} bytes",
            plan.write_chunk, plan.read_chunk
        ),
    ]
}
