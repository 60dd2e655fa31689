use std::process;

use clap::Parser;

mod cli;
mod commands;
mod exit_codes;
mod logging;
mod output;

fn main() {
    logging::init_tracing();

    let cli = cli::Cli::parse();

    let exit_code = match cli.command {
        cli::Command::Devices(args) => {
            let mut out = output::make(args.json);
            let code = commands::devices::run(&args, &mut *out);
            out.finish();
            code
        }
        cli::Command::Plan(args) => {
            let mut out = output::make(args.json);
            let code = commands::plan::run(&args, &mut *out);
            out.finish();
            code
        }
    };

    process::exit(exit_code);
}
