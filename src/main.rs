#![forbid(unsafe_code)]

//! sto: Spot Test Orchestrator CLI entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    match cli_app::run(&args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("sto: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
