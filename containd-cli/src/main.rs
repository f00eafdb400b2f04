//! containd command-line interface
//!
//! A minimal container runtime: namespace isolation, a chroot jail, and
//! cgroup v2 resource limits around a single command.

use clap::Parser;
use std::process;
use tracing::Level;

mod cli;
mod commands;

use cli::Cli;

fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    // Execute the command; the workload's own exit status becomes ours
    match commands::dispatch(cli.command) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("❌ Error: {e:#}");
            process::exit(1);
        }
    }
}
