use std::sync::Arc;

use anyhow::Result;

use containd_cgroup::{CgroupBackend, FsBackend, ToolBackend};

use crate::cli::{BackendKind, Commands};

pub mod purge;
pub mod run;

/// Dispatch command to appropriate handler; returns the process exit code
pub fn dispatch(command: Commands) -> Result<i32> {
    match command {
        Commands::Run(args) => run::execute(args),

        Commands::Purge { backend } => {
            purge::execute(backend)?;
            Ok(0)
        }

        Commands::Version => {
            print_version();
            Ok(0)
        }
    }
}

/// Instantiate the selected cgroup backend
pub(crate) fn make_backend(kind: BackendKind) -> Arc<dyn CgroupBackend> {
    match kind {
        BackendKind::Fs => Arc::new(FsBackend::new()),
        BackendKind::Tool => Arc::new(ToolBackend::new()),
    }
}

fn print_version() {
    println!("containd");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Features:");
    println!("  • Linux namespace isolation (pid, net, mnt, uts, ipc, cgroup)");
    println!("  • CGroup v2 resource limits (pids, memory)");
    println!("  • Chroot jail with sanitized environment");
}
