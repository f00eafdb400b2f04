//! CLI argument definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use containd_core::LimitValue;

#[derive(Parser)]
#[command(name = "containd")]
#[command(about = "Minimal container runtime", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a command in an isolated container
    Run(RunArgs),

    /// Remove orphaned cgroup nodes left behind by earlier runs
    Purge {
        /// How cgroup operations reach the kernel
        #[arg(long, value_enum, default_value_t = BackendKind::Fs)]
        backend: BackendKind,
    },

    /// Show runtime version and capabilities
    Version,
}

#[derive(Args)]
pub struct RunArgs {
    /// Container ID; generated when omitted, reused to load a saved
    /// configuration
    #[arg(short, long)]
    pub id: Option<String>,

    /// Directory to use as the container root
    #[arg(long)]
    pub rootfs: Option<PathBuf>,

    /// Process-count limit: a number or "max"
    #[arg(long)]
    pub pids: Option<LimitValue>,

    /// Memory limit in bytes: a number or "max"
    #[arg(long)]
    pub memory: Option<LimitValue>,

    /// Keep the cgroup node after exit, for inspection and a later purge
    #[arg(long)]
    pub retain_cgroup: bool,

    /// How cgroup operations reach the kernel
    #[arg(long, value_enum, default_value_t = BackendKind::Fs)]
    pub backend: BackendKind,

    /// Command to run
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

/// Which cgroup backend carries out create/write/remove operations
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Direct cgroup v2 filesystem writes (preferred)
    Fs,
    /// Delegation to the cgcreate/cgdelete tools
    Tool,
}
