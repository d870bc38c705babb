//! Per-host pipeline: probe, execute the plan, download artifacts, clean up.
//!
//! Each host walks the same state machine exactly once per run and always
//! ends in a single terminal outcome. Cleanup is attempted whenever the
//! execution phase was entered and the run has not been cancelled; a cleanup
//! failure is reported as a warning and never changes the host's outcome.

use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::cancel::CancelToken;
use crate::config::FleetConfig;
use crate::event::{EventSender, HostOutcome, HostStatus, LogLevel, Phase};
use crate::host::{Credentials, Host};
use crate::plan::{ArtifactSpec, OperationPlan};
use crate::probe::{ProbeOutcome, probe};
use crate::transport::{ExecOutput, Transport};

/// One host's walk through the probe, execute, download, cleanup phases.
pub struct HostPipeline<T: Transport> {
    transport: Arc<T>,
    config: Arc<FleetConfig>,
    plan: Arc<OperationPlan>,
    host: Host,
    credentials: Credentials,
    artifact_dir: Utf8PathBuf,
    events: EventSender,
    cancel: CancelToken,
}

enum StepsEnd {
    Completed {
        artifacts: Vec<Utf8PathBuf>,
        stdout: String,
        stderr: String,
    },
    Failed(Box<HostOutcome>),
    Cancelled,
}

impl<T: Transport> HostPipeline<T> {
    /// Creates a pipeline for one host.
    #[expect(clippy::too_many_arguments, reason = "construction site wires one field each")]
    #[must_use]
    pub const fn new(
        transport: Arc<T>,
        config: Arc<FleetConfig>,
        plan: Arc<OperationPlan>,
        host: Host,
        credentials: Credentials,
        artifact_dir: Utf8PathBuf,
        events: EventSender,
        cancel: CancelToken,
    ) -> Self {
        Self {
            transport,
            config,
            plan,
            host,
            credentials,
            artifact_dir,
            events,
            cancel,
        }
    }

    /// Runs the pipeline to its terminal outcome.
    ///
    /// Never panics and never returns early without an outcome; every exit
    /// path produces exactly one [`HostOutcome`].
    pub async fn run(self) -> HostOutcome {
        if self.cancel.is_cancelled() {
            return HostOutcome::cancelled(&self.host.name);
        }

        let target = self.host.login(&self.credentials);
        self.events.progress(&self.host.name, Phase::Probing);
        if let ProbeOutcome::Unreachable { reason } =
            probe(self.transport.as_ref(), &target, self.config.probe_timeout()).await
        {
            self.events.log(
                LogLevel::Error,
                format!("{}: unreachable: {reason}", self.host.name),
            );
            return HostOutcome::failure(&self.host.name, HostStatus::ConnectionFailed, reason);
        }

        match self.execute_steps(&target).await {
            StepsEnd::Cancelled => HostOutcome::cancelled(&self.host.name),
            StepsEnd::Failed(outcome) => {
                self.run_cleanup(&target).await;
                self.events.log(
                    LogLevel::Error,
                    format!("{}: {}", self.host.name, outcome.detail),
                );
                *outcome
            }
            StepsEnd::Completed {
                artifacts,
                stdout,
                stderr,
            } => {
                self.run_cleanup(&target).await;
                self.events
                    .log(LogLevel::Success, format!("{}: completed", self.host.name));
                let mut outcome = HostOutcome::success(&self.host.name, artifacts);
                outcome.stdout = stdout;
                outcome.stderr = stderr;
                outcome
            }
        }
    }

    async fn execute_steps(&self, target: &str) -> StepsEnd {
        let mut artifacts = Vec::new();
        let mut stdout = String::new();
        let mut stderr = String::new();

        for (index, step) in self.plan.steps().iter().enumerate() {
            if self.cancel.is_cancelled() {
                return StepsEnd::Cancelled;
            }
            self.events
                .progress(&self.host.name, Phase::Executing(index));

            let result = self
                .transport
                .exec(target, step.command(), self.config.command_timeout())
                .await;
            // A step in flight when cancellation arrives is allowed to
            // finish, but its result is discarded.
            if self.cancel.is_cancelled() {
                return StepsEnd::Cancelled;
            }
            let output = match result {
                Ok(output) => output,
                Err(err) => {
                    return StepsEnd::Failed(Box::new(self.step_failure(
                        index,
                        err.to_string(),
                        &stdout,
                        &stderr,
                    )));
                }
            };
            stdout = output.stdout.clone();
            stderr = output.stderr.clone();

            if !step.succeeded(&output) {
                return StepsEnd::Failed(Box::new(self.step_failure(
                    index,
                    step_diagnostic(&output),
                    &stdout,
                    &stderr,
                )));
            }

            for artifact in step.artifacts() {
                if self.cancel.is_cancelled() {
                    return StepsEnd::Cancelled;
                }
                match self.fetch_artifact(target, artifact).await {
                    Ok(local) => artifacts.push(local),
                    Err(detail) => {
                        return StepsEnd::Failed(Box::new(self.step_failure(
                            index, detail, &stdout, &stderr,
                        )));
                    }
                }
            }
        }

        StepsEnd::Completed {
            artifacts,
            stdout,
            stderr,
        }
    }

    async fn fetch_artifact(
        &self,
        target: &str,
        artifact: &ArtifactSpec,
    ) -> Result<Utf8PathBuf, String> {
        self.events.progress(&self.host.name, Phase::Downloading);
        let local = self
            .artifact_dir
            .join(format!("{}_{}", self.host.name, artifact.local_name));
        self.transport
            .fetch(
                target,
                &artifact.remote_path,
                &local,
                self.config.transfer_timeout(),
            )
            .await
            .map_err(|err| format!("failed to retrieve {}: {err}", artifact.remote_path))?;
        Ok(local)
    }

    async fn run_cleanup(&self, target: &str) {
        let Some(command) = self.plan.cleanup() else {
            return;
        };
        if self.cancel.is_cancelled() {
            return;
        }
        self.events.progress(&self.host.name, Phase::Cleanup);
        let failure = match self
            .transport
            .exec(target, command, self.config.cleanup_timeout())
            .await
        {
            Ok(output) if output.is_success() => None,
            Ok(output) => Some(step_diagnostic(&output)),
            Err(err) => Some(err.to_string()),
        };
        if let Some(detail) = failure {
            self.events.log(
                LogLevel::Warning,
                format!("{}: cleanup failed: {detail}", self.host.name),
            );
        }
    }

    fn step_failure(
        &self,
        index: usize,
        detail: String,
        stdout: &str,
        stderr: &str,
    ) -> HostOutcome {
        let mut outcome = HostOutcome::failure(
            &self.host.name,
            HostStatus::OperationFailed,
            format!("step {} failed: {detail}", index + 1),
        );
        outcome.stdout = stdout.to_owned();
        outcome.stderr = stderr.to_owned();
        outcome
    }
}

fn step_diagnostic(output: &ExecOutput) -> String {
    let status = output
        .exit_code
        .map_or_else(|| String::from("killed by signal"), |code| format!("exit code {code}"));
    let detail = output.stderr.trim();
    if detail.is_empty() {
        status
    } else {
        format!("{status}: {detail}")
    }
}
