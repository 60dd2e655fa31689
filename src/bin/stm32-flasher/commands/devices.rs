use stm32_flasher::devices;

use crate::cli;
use crate::exit_codes;
use crate::output::{Event, Reporter};

pub fn run(_args: &cli::DevicesArgs, out: &mut dyn Reporter) -> i32 {
    out.emit(Event::Devices(devices::DEVICES.iter().collect()));
    exit_codes::EXIT_OK
}
