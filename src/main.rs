//! fnctl CLI entry point
//!
//! This is a minimal entrypoint that:
//! 1. Initialises logging
//! 2. Dispatches to CLI commands (via cli::run)
//! 3. Prints errors to stderr
//! 4. Exits with non-zero on failure

use fnctl::cli;
use fnctl::observability::{self, LogFormat};

fn main() {
    observability::init(LogFormat::from_env());

    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
