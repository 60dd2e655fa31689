use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "stm32-flasher")]
#[command(about = "STM32 serial bootloader flashing planner")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the built-in product table.
    Devices(DevicesArgs),

    /// Show which memory an operation would touch, without a target attached.
    Plan(PlanArgs),
}

#[derive(Parser)]
pub struct DevicesArgs {
    /// Emit JSON line output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone, Debug, Default)]
pub struct ActionArgs {
    /// Read memory into a file.
    #[arg(short = 'r', long)]
    pub read: bool,

    /// Write a file into memory.
    #[arg(short = 'w', long)]
    pub write: bool,

    /// Disable flash write protection.
    #[arg(short = 'u', long)]
    pub write_unprotect: bool,

    /// Enable flash read protection.
    #[arg(short = 'j', long)]
    pub read_protect: bool,

    /// Disable flash read protection.
    #[arg(short = 'k', long)]
    pub read_unprotect: bool,

    /// Erase only.
    #[arg(short = 'o', long)]
    pub erase_only: bool,

    /// Compute the CRC of the memory window.
    #[arg(short = 'C', long)]
    pub crc: bool,
}

#[derive(Parser)]
pub struct PlanArgs {
    /// Product id as reported by the bootloader (e.g. 0x410).
    #[arg(long, value_parser = parse_int::parse::<u16>)]
    pub pid: u16,

    #[command(flatten)]
    pub actions: ActionArgs,

    /// Start address.
    #[arg(short = 'S', long, value_parser = parse_int::parse::<u32>, conflicts_with = "page")]
    pub start: Option<u32>,

    /// Length in bytes from the start address.
    #[arg(long, value_parser = parse_int::parse::<u32>, conflicts_with = "page")]
    pub length: Option<u32>,

    /// First flash page.
    #[arg(short = 's', long, value_parser = parse_int::parse::<u32>)]
    pub page: Option<u32>,

    /// Number of pages (default: up to the end of flash).
    #[arg(short = 'e', long, value_parser = parse_int::parse::<u32>, requires = "page")]
    pub count: Option<u32>,

    /// Verify writes.
    #[arg(short = 'v', long)]
    pub verify: bool,

    /// Do not erase before writing.
    #[arg(short = 'n', long)]
    pub no_erase: bool,

    /// JSON file with session options; flags given here win.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Emit JSON line output.
    #[arg(long)]
    pub json: bool,
}
