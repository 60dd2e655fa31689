use stm32_flasher::{
    api::{self, FlashOptions},
    config, devices,
    operation::Action,
    window::Selector,
};

use crate::cli;
use crate::exit_codes;
use crate::output::{Event, PlanReport, Reporter};

pub fn run(args: &cli::PlanArgs, out: &mut dyn Reporter) -> i32 {
    match plan(args) {
        Ok(report) => {
            out.emit(Event::Plan(report));
            exit_codes::EXIT_OK
        }
        Err((code, message)) => {
            out.emit(Event::Error { code, message });
            code
        }
    }
}

fn plan(args: &cli::PlanArgs) -> Result<PlanReport, (i32, String)> {
    let action = api::select_action(&requested_actions(&args.actions))
        .map_err(|e| (exit_codes::for_kind(e.kind()), e.to_string()))?;

    let device = devices::lookup(args.pid).ok_or_else(|| {
        (
            exit_codes::EXIT_UNKNOWN_DEVICE,
            format!("unknown product id 0x{:04X}", args.pid),
        )
    })?;

    let mut opts = match &args.config {
        Some(path) => config::load_options(path)
            .map_err(|e| (exit_codes::EXIT_CONFIG, e.to_string()))?,
        None => FlashOptions::default(),
    };
    opts.verify |= args.verify;
    opts.no_erase |= args.no_erase;

    let selector = selector(args);
    let map = device.memory_map();
    let plan = api::plan_operation(action, &selector, &map, &opts)
        .map_err(|e| (exit_codes::for_kind(e.kind()), e.to_string()))?;

    tracing::debug!(?selector, ?plan, "planned");
    Ok(PlanReport {
        device,
        selector,
        plan,
    })
}

pub(crate) fn requested_actions(a: &cli::ActionArgs) -> Vec<Action> {
    [
        (a.read, Action::Read),
        (a.write, Action::Write),
        (a.write_unprotect, Action::WriteUnprotect),
        (a.read_protect, Action::ReadProtect),
        (a.read_unprotect, Action::ReadUnprotect),
        (a.erase_only, Action::EraseOnly),
        (a.crc, Action::Crc),
    ]
    .into_iter()
    .filter_map(|(set, action)| set.then_some(action))
    .collect()
}

pub(crate) fn selector(args: &cli::PlanArgs) -> Selector {
    if let Some(start_page) = args.page {
        Selector::Pages {
            start_page,
            count: args.count,
        }
    } else if args.start.is_some() || args.length.is_some() {
        Selector::Address {
            start: args.start.unwrap_or(0),
            length: args.length,
        }
    } else {
        Selector::Whole
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(argv: &[&str]) -> cli::PlanArgs {
        let mut full = vec!["stm32-flasher", "plan"];
        full.extend_from_slice(argv);
        match cli::Cli::parse_from(full).command {
            cli::Command::Plan(args) => args,
            _ => panic!("expected plan"),
        }
    }

    #[test]
    fn hex_addresses_and_pages() {
        let args = parse(&["--pid", "0x410", "-w", "-S", "0x08001000", "--length", "0x400"]);
        assert_eq!(args.pid, 0x410);
        assert_eq!(
            selector(&args),
            Selector::Address {
                start: 0x0800_1000,
                length: Some(0x400)
            }
        );

        let args = parse(&["--pid", "0x410", "-o", "-s", "2", "-e", "3"]);
        assert_eq!(
            selector(&args),
            Selector::Pages {
                start_page: 2,
                count: Some(3)
            }
        );
        assert_eq!(selector(&parse(&["--pid", "0x410"])), Selector::Whole);
    }

    #[test]
    fn two_actions_are_a_configuration_error() {
        let args = parse(&["--pid", "0x410", "-r", "-w"]);
        assert_eq!(
            requested_actions(&args.actions),
            vec![Action::Read, Action::Write]
        );
        let (code, message) = plan(&args).unwrap_err();
        assert_eq!(code, exit_codes::EXIT_CONFIG);
        assert!(message.contains("memory read"));
    }

    #[test]
    fn unaligned_erase_is_rejected() {
        let args = parse(&["--pid", "0x410", "-o", "-S", "0x08000010", "--length", "1024"]);
        let (code, _) = plan(&args).unwrap_err();
        assert_eq!(code, exit_codes::EXIT_ALIGNMENT);
    }

    #[test]
    fn unknown_product_id() {
        let (code, _) = plan(&parse(&["--pid", "0xFFFF", "-w"])).unwrap_err();
        assert_eq!(code, exit_codes::EXIT_UNKNOWN_DEVICE);
    }

    #[test]
    fn config_file_feeds_options() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut f, br#"{ "no_erase": true }"#).unwrap();
        let path = f.path().display().to_string();
        let report = plan(&parse(&["--pid", "0x410", "-w", "--config", &path])).unwrap();
        assert_eq!(report.plan.erase, None);
    }
}
