//! Fleet orchestration: bounded-concurrency fan-out over the host table.
//!
//! The orchestrator submits one pipeline per host, bounded by the configured
//! concurrency. With a concurrency of one, pipelines run inline in
//! submission order and the outcome order matches the host table. With more
//! workers, outcomes arrive in completion order. Either way every host ends
//! in exactly one terminal outcome and the run finishes with a single
//! `RunDone` event.

use std::collections::HashMap;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cancel::CancelToken;
use crate::config::FleetConfig;
use crate::event::{EventSender, HostOutcome, HostStatus, RunSummary};
use crate::host::{Credentials, Fleet, Host};
use crate::pipeline::HostPipeline;
use crate::plan::OperationPlan;
use crate::transport::Transport;

/// Errors raised before any host pipeline is started.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FleetError {
    /// Raised when the host table is empty.
    #[error("the host table is empty")]
    EmptyFleet,
    /// Raised when cancellation was requested before the run started.
    #[error("cancellation was requested before the run started")]
    AlreadyCancelled,
}

/// Runs one operation plan across a fleet with bounded concurrency.
pub struct FleetOrchestrator<T> {
    transport: Arc<T>,
    config: Arc<FleetConfig>,
}

impl<T: Transport + Send + Sync + 'static> FleetOrchestrator<T> {
    /// Creates an orchestrator over the given transport and configuration.
    #[must_use]
    pub const fn new(transport: Arc<T>, config: Arc<FleetConfig>) -> Self {
        Self { transport, config }
    }

    /// Runs `plan` against every host in `fleet`.
    ///
    /// Emits progress, log, and `HostDone` events through `events` while
    /// running, then a single `RunDone` carrying the returned summary.
    /// Cancellation requested through `cancel` mid-run still yields one
    /// terminal outcome per host.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::EmptyFleet`] for an empty host table and
    /// [`FleetError::AlreadyCancelled`] when `cancel` was set before the
    /// call.
    pub async fn run(
        &self,
        fleet: &Fleet,
        credentials: &Credentials,
        plan: Arc<OperationPlan>,
        artifact_dir: &Utf8Path,
        cancel: CancelToken,
        events: EventSender,
    ) -> Result<RunSummary, FleetError> {
        if fleet.is_empty() {
            return Err(FleetError::EmptyFleet);
        }
        if cancel.is_cancelled() {
            return Err(FleetError::AlreadyCancelled);
        }

        let outcomes = if self.config.concurrency <= 1 {
            self.run_sequential(fleet, credentials, plan, artifact_dir, &cancel, &events)
                .await
        } else {
            self.run_concurrent(fleet, credentials, plan, artifact_dir, &cancel, &events)
                .await
        };

        let summary = RunSummary::from_outcomes(fleet.len(), outcomes);
        events.run_done(summary.clone());
        Ok(summary)
    }

    /// Processes hosts strictly one at a time, in host table order.
    ///
    /// Running inline rather than through the semaphore keeps the outcome
    /// order identical to the submission order, which the concurrency-one
    /// contract promises.
    async fn run_sequential(
        &self,
        fleet: &Fleet,
        credentials: &Credentials,
        plan: Arc<OperationPlan>,
        artifact_dir: &Utf8Path,
        cancel: &CancelToken,
        events: &EventSender,
    ) -> Vec<HostOutcome> {
        let mut outcomes = Vec::with_capacity(fleet.len());
        for host in fleet.hosts() {
            let outcome = if host.skip {
                HostOutcome::skipped(&host.name)
            } else {
                self.pipeline(host, credentials, Arc::clone(&plan), artifact_dir, cancel, events)
                    .run()
                    .await
            };
            events.host_done(outcome.clone());
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn run_concurrent(
        &self,
        fleet: &Fleet,
        credentials: &Credentials,
        plan: Arc<OperationPlan>,
        artifact_dir: &Utf8Path,
        cancel: &CancelToken,
        events: &EventSender,
    ) -> Vec<HostOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks = JoinSet::new();
        let mut names = HashMap::new();
        let mut outcomes = Vec::with_capacity(fleet.len());

        for host in fleet.hosts() {
            if host.skip {
                let outcome = HostOutcome::skipped(&host.name);
                events.host_done(outcome.clone());
                outcomes.push(outcome);
                continue;
            }
            let semaphore = Arc::clone(&semaphore);
            let pipeline =
                self.pipeline(host, credentials, Arc::clone(&plan), artifact_dir, cancel, events);
            let name = host.name.clone();
            let worker_events = events.clone();
            let handle = tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return HostOutcome::failure(
                        &name,
                        HostStatus::OperationFailed,
                        "concurrency limiter closed",
                    );
                };
                let outcome = pipeline.run().await;
                worker_events.host_done(outcome.clone());
                outcome
            });
            names.insert(handle.id(), host.name.clone());
        }

        while let Some(result) = tasks.join_next_with_id().await {
            match result {
                Ok((_id, outcome)) => outcomes.push(outcome),
                Err(err) => {
                    // A panicking pipeline still owes the run one outcome.
                    let host = names
                        .get(&err.id())
                        .cloned()
                        .unwrap_or_else(|| String::from("unknown"));
                    let outcome = HostOutcome::failure(
                        host,
                        HostStatus::OperationFailed,
                        format!("pipeline aborted: {err}"),
                    );
                    events.host_done(outcome.clone());
                    outcomes.push(outcome);
                }
            }
        }
        outcomes
    }

    fn pipeline(
        &self,
        host: &Host,
        credentials: &Credentials,
        plan: Arc<OperationPlan>,
        artifact_dir: &Utf8Path,
        cancel: &CancelToken,
        events: &EventSender,
    ) -> HostPipeline<T> {
        HostPipeline::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.config),
            plan,
            host.clone(),
            credentials.clone(),
            Utf8PathBuf::from(artifact_dir),
            events.clone(),
            cancel.clone(),
        )
    }
}

#[cfg(test)]
mod tests;
