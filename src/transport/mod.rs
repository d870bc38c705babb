//! Remote execution and artifact transfer over the system SSH clients.
//!
//! The orchestrator treats the transport as a black box satisfying two
//! contracts: run a command on a remote host, and fetch one remote file.
//! [`SshTransport`] satisfies them by shelling out to `ssh` and `scp`
//! through a [`CommandRunner`] seam, preserving remote exit codes and
//! enforcing an explicit timeout on every call. Credentials are injected
//! via SSH options (identity file, batch mode), never interpolated into the
//! remote command line.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use camino::Utf8Path;
use shell_escape::unix::escape;
use thiserror::Error;

use crate::config::FleetConfig;
use crate::host::Credentials;

mod util;

pub use util::expand_tilde;

/// Result of running a remote command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecOutput {
    /// Exit code reported by the remote command, if available.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ExecOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Errors surfaced by the transport layer.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransportError {
    /// Raised when a client process cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a call does not finish within its timeout.
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// Description of the call that timed out.
        operation: String,
        /// Timeout that was applied, in seconds.
        seconds: u64,
    },
    /// Raised when a file transfer completes with a non-zero exit code.
    #[error("{program} exited with status {status_text}: {stderr}")]
    TransferFailure {
        /// Transfer client used for the attempt.
        program: String,
        /// Exit status as reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the client.
        stderr: String,
    },
}

/// Future returned by transport operations.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Remote execution and file retrieval contract used by the orchestrator.
pub trait Transport {
    /// Runs `command` on the host at `target` (`user@host`), capturing
    /// output. Remote exit codes are preserved: a non-zero exit is an `Ok`
    /// output, not a transport error.
    fn exec<'a>(
        &'a self,
        target: &'a str,
        command: &'a str,
        timeout: Duration,
    ) -> TransportFuture<'a, ExecOutput>;

    /// Transfers one remote file to `local_path`.
    fn fetch<'a>(
        &'a self,
        target: &'a str,
        remote_path: &'a str,
        local_path: &'a Utf8Path,
        timeout: Duration,
    ) -> TransportFuture<'a, ()>;
}

/// Abstraction over client process execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments under `timeout`, capturing
    /// stdout and stderr.
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [OsString],
        timeout: Duration,
    ) -> TransportFuture<'a, ExecOutput>;
}

/// Real command runner that spawns the program via tokio.
///
/// The child is spawned with `kill_on_drop` so a timed-out call does not
/// leave an SSH client lingering.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [OsString],
        timeout: Duration,
    ) -> TransportFuture<'a, ExecOutput> {
        Box::pin(async move {
            let child = tokio::process::Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|err| TransportError::Spawn {
                    program: program.to_owned(),
                    message: err.to_string(),
                })?;

            let output = tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| TransportError::Timeout {
                    operation: program.to_owned(),
                    seconds: timeout.as_secs(),
                })?
                .map_err(|err| TransportError::Spawn {
                    program: program.to_owned(),
                    message: err.to_string(),
                })?;

            Ok(ExecOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

/// [`Transport`] implementation shelling out to the system `ssh` and `scp`.
#[derive(Clone, Debug)]
pub struct SshTransport<R: CommandRunner> {
    config: FleetConfig,
    credentials: Credentials,
    runner: R,
}

impl SshTransport<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    #[must_use]
    pub const fn with_process_runner(config: FleetConfig, credentials: Credentials) -> Self {
        Self::new(config, credentials, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> SshTransport<R> {
    /// Creates a transport using the provided runner, configuration, and
    /// run credentials.
    #[must_use]
    pub const fn new(config: FleetConfig, credentials: Credentials, runner: R) -> Self {
        Self {
            config,
            credentials,
            runner,
        }
    }

    /// Builds the SSH options shared by `ssh` and `scp` invocations.
    fn common_options(&self) -> Vec<OsString> {
        let mut args = Vec::new();

        let identity = self
            .credentials
            .identity_file
            .as_deref()
            .or(self.config.ssh_identity_file.as_deref());
        if let Some(identity_file) = identity {
            let expanded = expand_tilde(identity_file);
            args.push(OsString::from("-i"));
            args.push(OsString::from(expanded));
        }

        if self.config.ssh_batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.ssh_strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.ssh_known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.ssh_known_hosts_file
            )));
        }

        args.push(OsString::from("-o"));
        args.push(OsString::from(format!(
            "ConnectTimeout={}",
            self.config.probe_timeout_secs
        )));

        args
    }

    fn build_exec_args(&self, target: &str, command: &str) -> Vec<OsString> {
        let mut args = self.common_options();
        args.push(OsString::from(target));
        args.push(OsString::from(command));
        args
    }

    fn build_fetch_args(
        &self,
        target: &str,
        remote_path: &str,
        local_path: &Utf8Path,
    ) -> Vec<OsString> {
        let mut args = self.common_options();
        // The remote side of an scp path is interpreted by the remote shell.
        let remote = escape(remote_path.into());
        args.push(OsString::from(format!("{target}:{remote}")));
        args.push(OsString::from(local_path.as_str()));
        args
    }
}

impl<R: CommandRunner + Sync> Transport for SshTransport<R> {
    fn exec<'a>(
        &'a self,
        target: &'a str,
        command: &'a str,
        timeout: Duration,
    ) -> TransportFuture<'a, ExecOutput> {
        Box::pin(async move {
            let args = self.build_exec_args(target, command);
            self.runner.run(&self.config.ssh_bin, &args, timeout).await
        })
    }

    fn fetch<'a>(
        &'a self,
        target: &'a str,
        remote_path: &'a str,
        local_path: &'a Utf8Path,
        timeout: Duration,
    ) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let args = self.build_fetch_args(target, remote_path, local_path);
            let output = self.runner.run(&self.config.scp_bin, &args, timeout).await?;
            if output.is_success() {
                return Ok(());
            }

            let status_text = output
                .exit_code
                .map_or_else(|| String::from("unknown"), |code| code.to_string());
            Err(TransportError::TransferFailure {
                program: self.config.scp_bin.clone(),
                status: output.exit_code,
                status_text,
                stderr: output.stderr,
            })
        })
    }
}
