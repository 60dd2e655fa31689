use std::collections::BTreeMap;

use stm32_flasher::devices::Device;

use crate::output::{Event, PlanReport, Reporter};

#[derive(serde::Serialize)]
pub struct JsonEvent {
    schema: u32,
    event: &'static str,
    #[serde(flatten)]
    fields: BTreeMap<&'static str, serde_json::Value>,
}

impl JsonEvent {
    pub fn status(event: &'static str) -> Self {
        Self {
            schema: 1,
            event,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_u64(mut self, k: &'static str, v: u64) -> Self {
        self.fields.insert(k, serde_json::Value::from(v));
        self
    }

    pub fn with_str(mut self, k: &'static str, v: &str) -> Self {
        self.fields.insert(k, serde_json::Value::from(v));
        self
    }

    pub fn with_value(mut self, k: &'static str, v: serde_json::Value) -> Self {
        self.fields.insert(k, v);
        self
    }
}

fn to_value<T: serde::Serialize>(v: &T) -> serde_json::Value {
    serde_json::to_value(v).unwrap_or(serde_json::Value::Null)
}

#[derive(Default)]
pub struct JsonOutput;

impl JsonOutput {
    pub fn new() -> Self {
        Self
    }

    fn json_event(&mut self, ev: JsonEvent) {
        println!(
            "{}",
            serde_json::to_string(&ev).unwrap_or_else(|_| "{}".to_string())
        );
    }
}

impl Reporter for JsonOutput {
    fn emit(&mut self, event: Event) {
        match event {
            Event::Devices(devices) => self.json_event(devices_to_json(&devices)),
            Event::Plan(report) => self.json_event(plan_to_json(&report)),
            Event::Error { code, message } => self.json_event(
                JsonEvent::status("error")
                    .with_u64("code", code as u64)
                    .with_str("message", &message),
            ),
        }
    }

    fn finish(&mut self) {}
}

pub fn devices_to_json(devices: &[&Device]) -> JsonEvent {
    JsonEvent::status("devices")
        .with_u64("count", devices.len() as u64)
        .with_value("devices", to_value(&devices))
}

pub fn plan_to_json(report: &PlanReport) -> JsonEvent {
    JsonEvent::status("plan")
        .with_u64("product_id", report.device.product_id as u64)
        .with_str("device", report.device.name)
        .with_str("action", report.plan.action.describe())
        .with_value("selector", to_value(&report.selector))
        .with_value("window", to_value(&report.plan.window))
        .with_value("erase", to_value(&report.plan.erase))
        .with_u64("write_chunk", report.plan.write_chunk as u64)
        .with_u64("read_chunk", report.plan.read_chunk as u64)
}
