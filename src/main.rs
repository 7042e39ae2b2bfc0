//! Provides the main entry point to the program.
use anyhow::Result;
use human_panic::setup_panic;
use mathprog::cli::run_cli;

fn main() -> Result<()> {
    // Use human_panic to provide a friendly message for unhandled panics
    setup_panic!();

    run_cli()
}
