use stm32_flasher::api::{plan_operation, FlashOptions};
use stm32_flasher::devices;
use stm32_flasher::operation::Action;
use stm32_flasher::window::Selector;

use super::human::{device_line, plan_lines};
use super::json::{devices_to_json, plan_to_json};
use super::PlanReport;

fn report(action: Action, selector: Selector) -> PlanReport {
    let device = devices::lookup(0x410).unwrap();
    let plan = plan_operation(
        action,
        &selector,
        &device.memory_map(),
        &FlashOptions::default(),
    )
    .unwrap();
    PlanReport {
        device,
        selector,
        plan,
    }
}

#[test]
fn plan_json_has_schema_and_window() {
    let ev = plan_to_json(&report(Action::Write, Selector::Whole));
    let v = serde_json::to_value(&ev).unwrap();
    assert_eq!(v.get("schema").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(v.get("event").and_then(|v| v.as_str()), Some("plan"));
    assert_eq!(v.get("action").and_then(|v| v.as_str()), Some("memory write"));
    assert_eq!(v["window"]["start"].as_u64(), Some(0x0800_0000));
    assert_eq!(v["window"]["pages"].as_str(), Some("mass_erase"));
    assert_eq!(v["selector"]["kind"].as_str(), Some("whole"));
    assert_eq!(v.get("write_chunk").and_then(|v| v.as_u64()), Some(256));
}

#[test]
fn plan_json_page_erase() {
    let ev = plan_to_json(&report(
        Action::EraseOnly,
        Selector::Pages {
            start_page: 2,
            count: Some(3),
        },
    ));
    let v = serde_json::to_value(&ev).unwrap();
    assert_eq!(v["erase"]["first_page"].as_u64(), Some(2));
    assert_eq!(v["erase"]["pages"]["pages"].as_u64(), Some(3));
}

#[test]
fn human_plan_lines() {
    let lines = plan_lines(&report(
        Action::EraseOnly,
        Selector::Pages {
            start_page: 2,
            count: Some(3),
        },
    ));
    assert!(lines.iter().any(|l| l.contains("flash erase")));
    assert!(lines
        .iter()
        .any(|l| l.contains("0x08000800..0x08001400")));
    assert!(lines.iter().any(|l| l.ends_with("pages 2..5")));
}

#[test]
fn device_listing() {
    let all: Vec<_> = devices::DEVICES.iter().collect();
    let v = serde_json::to_value(devices_to_json(&all)).unwrap();
    assert_eq!(v["count"].as_u64(), Some(all.len() as u64));
    assert!(device_line(all[0]).starts_with("0x"));
}
