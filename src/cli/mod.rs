//! Command-line interface definitions for the `armada` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use camino::Utf8PathBuf;
use clap::Parser;

/// Top-level CLI for the `armada` binary.
#[derive(Debug, Parser)]
#[command(
    name = "armada",
    about = "Run an operation across a fleet of SSH hosts and collect the artifacts",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Probe the fleet, run the plan, and download artifacts.
    #[command(
        name = "run",
        about = "Probe the fleet, run the plan, and download artifacts"
    )]
    Run(RunCommand),
}

/// Arguments for the `armada run` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RunCommand {
    /// Path to the JSON host table, an object mapping host name to
    /// `user@address` or a bare address.
    #[arg(long, value_name = "PATH")]
    pub(crate) hosts: Utf8PathBuf,
    /// Remote command to run on every host; repeat for multiple ordered
    /// steps.
    #[arg(long = "command", value_name = "CMD", required = true)]
    pub(crate) commands: Vec<String>,
    /// Remote file to download after the last step, as `REMOTE[:LOCAL]`.
    ///
    /// The local name defaults to the remote file name and is prefixed with
    /// the host name in the run directory. Repeatable.
    #[arg(long = "artifact", value_name = "REMOTE[:LOCAL]")]
    pub(crate) artifacts: Vec<String>,
    /// Cleanup command always attempted on each host after its steps.
    #[arg(long, value_name = "CMD")]
    pub(crate) cleanup: Option<String>,
    /// Exclude a host from this run; it is reported as skipped. Repeatable.
    #[arg(long = "skip", value_name = "HOST")]
    pub(crate) skip: Vec<String>,
    /// Override the configured number of hosts processed concurrently.
    #[arg(long, value_name = "N")]
    pub(crate) concurrency: Option<usize>,
}
