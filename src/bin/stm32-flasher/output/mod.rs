use stm32_flasher::{api::FlashPlan, devices::Device, window::Selector};

pub mod human;
pub mod json;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone)]
pub struct PlanReport {
    pub device: &'static Device,
    pub selector: Selector,
    pub plan: FlashPlan,
}

#[derive(Debug, Clone)]
pub enum Event {
    Devices(Vec<&'static Device>),
    Plan(PlanReport),
    Error { code: i32, message: String },
}

pub trait Reporter {
    fn emit(&mut self, event: Event);
    fn finish(&mut self);
}

pub fn make(json: bool) -> Box<dyn Reporter> {
    if json {
        Box::new(json::JsonOutput::new())
    } else {
        Box::new(human::HumanOutput::new())
    }
}
