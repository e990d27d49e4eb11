//! kodebase - file-based artifact tracking with an event-sourced lifecycle

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = kodebase::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
