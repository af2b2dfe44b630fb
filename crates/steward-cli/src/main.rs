use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

mod completion;
mod dispatch;
mod logging;
mod render;

use completion::CliCompletionShell;

#[derive(Parser, Debug)]
#[command(name = "steward")]
#[command(about = "Keeps a host application and its extensions up to date", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to $STEWARD_CONFIG or ~/.steward/steward.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show what is known about available updates
    Check {
        /// Ask the telemetry authority even if nothing is cached
        #[arg(long)]
        force: bool,
    },
    /// List pending updates with their release notes
    List {
        #[arg(long)]
        force: bool,
    },
    /// Show critical and manual-update flags from the cached check
    Status,
    /// Drop cached update information
    Flush,
    /// Check that every update target is writable
    Preflight,
    /// Apply an update to the core, or to one extension
    Apply {
        #[arg(long)]
        extension: Option<String>,
    },
    /// Inspect or set whether the host system is live
    System {
        #[command(subcommand)]
        action: SystemAction,
    },
    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum SystemAction {
    On,
    Off,
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);
    dispatch::run_cli(cli)
}
