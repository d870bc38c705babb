//! Event model, result channel, and consumer-side run state.
//!
//! Workers never touch shared display state: they only produce [`Event`]s
//! onto the result channel, and exactly one consumer drains the channel and
//! applies events to its own [`RunState`]. That single-consumer rule is the
//! crate's core correctness device; it removes the need for any lock around
//! aggregate counters.

use std::fmt;

use camino::Utf8PathBuf;
use tokio::sync::mpsc;

/// Pipeline phase reported through progress events.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Phase {
    /// Verifying reachability before committing to further work.
    Probing,
    /// Running the plan step with this zero-based index.
    Executing(usize),
    /// Downloading an artifact produced by a step.
    Downloading,
    /// Removing remote temporary state.
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probing => write!(formatter, "probing"),
            Self::Executing(index) => write!(formatter, "step {}", index + 1),
            Self::Downloading => write!(formatter, "downloading"),
            Self::Cleanup => write!(formatter, "cleanup"),
        }
    }
}

/// Severity of a log event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    /// Routine progress information.
    Info,
    /// A host or step finished successfully.
    Success,
    /// Recoverable trouble, such as a failed cleanup.
    Warning,
    /// A host-scoped failure.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "INFO",
            Self::Success => "OK",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
        };
        formatter.write_str(label)
    }
}

/// Terminal status of one host in one run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HostStatus {
    /// Every step succeeded and all artifacts were retrieved.
    Success,
    /// The connection probe failed; no operation was attempted.
    ConnectionFailed,
    /// A step, artifact transfer, or the transport itself failed.
    OperationFailed,
    /// The host was excluded from this run by the caller.
    Skipped,
    /// The run was cancelled before this host's pipeline finished.
    Cancelled,
}

impl fmt::Display for HostStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::ConnectionFailed => "connection failed",
            Self::OperationFailed => "operation failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        };
        formatter.write_str(label)
    }
}

/// The immutable terminal record for one host in one run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostOutcome {
    /// Host name from the fleet table.
    pub host: String,
    /// Terminal status.
    pub status: HostStatus,
    /// Human-readable diagnostic; empty on success.
    pub detail: String,
    /// Stdout captured from the last executed step.
    pub stdout: String,
    /// Stderr captured from the last executed step.
    pub stderr: String,
    /// Local paths of artifacts retrieved before the pipeline ended.
    pub artifacts: Vec<Utf8PathBuf>,
}

impl HostOutcome {
    /// Creates a successful outcome with the retrieved artifact paths.
    #[must_use]
    pub fn success(host: impl Into<String>, artifacts: Vec<Utf8PathBuf>) -> Self {
        Self {
            host: host.into(),
            status: HostStatus::Success,
            detail: String::new(),
            stdout: String::new(),
            stderr: String::new(),
            artifacts,
        }
    }

    /// Creates a failure outcome with a diagnostic.
    #[must_use]
    pub fn failure(host: impl Into<String>, status: HostStatus, detail: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            status,
            detail: detail.into(),
            stdout: String::new(),
            stderr: String::new(),
            artifacts: Vec::new(),
        }
    }

    /// Creates a cancelled outcome.
    #[must_use]
    pub fn cancelled(host: impl Into<String>) -> Self {
        Self::failure(host, HostStatus::Cancelled, "run cancelled")
    }

    /// Creates a skipped outcome.
    #[must_use]
    pub fn skipped(host: impl Into<String>) -> Self {
        Self::failure(host, HostStatus::Skipped, "excluded from this run")
    }
}

/// Aggregate counts and outcomes for one completed (or cancelled) run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunSummary {
    /// Number of hosts in the fleet, including skipped ones.
    pub total: usize,
    /// Hosts that finished with [`HostStatus::Success`].
    pub succeeded: usize,
    /// Hosts that finished with a connection or operation failure.
    pub failed: usize,
    /// Hosts cancelled before their pipeline finished.
    pub cancelled: usize,
    /// Hosts excluded from the run by the caller.
    pub skipped: usize,
    /// One outcome per host, in completion order.
    pub outcomes: Vec<HostOutcome>,
}

impl RunSummary {
    /// Builds a summary from outcomes in completion order.
    #[must_use]
    pub fn from_outcomes(total: usize, outcomes: Vec<HostOutcome>) -> Self {
        let mut summary = Self {
            total,
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            skipped: 0,
            outcomes: Vec::new(),
        };
        for outcome in &outcomes {
            match outcome.status {
                HostStatus::Success => summary.succeeded += 1,
                HostStatus::ConnectionFailed | HostStatus::OperationFailed => summary.failed += 1,
                HostStatus::Cancelled => summary.cancelled += 1,
                HostStatus::Skipped => summary.skipped += 1,
            }
        }
        summary.outcomes = outcomes;
        summary
    }

    /// Returns `true` when no host failed and the run was not cancelled.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}

/// Tagged event carried from workers to the single consumer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// A host entered a new pipeline phase.
    Progress {
        /// Host name from the fleet table.
        host: String,
        /// Phase the host just entered.
        phase: Phase,
    },
    /// A log line for the caller's display.
    Log {
        /// Severity of the message.
        level: LogLevel,
        /// Message text.
        message: String,
    },
    /// A host reached its terminal state.
    HostDone(HostOutcome),
    /// The whole run finished; emitted exactly once.
    RunDone(RunSummary),
}

/// Aggregate display state owned and mutated only by the consumer.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunState {
    /// Number of hosts in the run.
    pub total: usize,
    /// Hosts that reached a terminal state so far. Monotonically
    /// non-decreasing, up to `total`.
    pub completed: usize,
    /// Successful hosts so far.
    pub succeeded: usize,
    /// Failed hosts so far.
    pub failed: usize,
    /// Cancelled hosts so far.
    pub cancelled: usize,
    /// Skipped hosts so far.
    pub skipped: usize,
    /// Host most recently reported in a progress event.
    pub current_host: Option<String>,
    /// Set once the final summary has been observed.
    pub finished: bool,
}

impl RunState {
    /// Creates a state tracking `total` hosts.
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Applies one event. Must only ever be called from the single consumer.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::Progress { host, .. } => {
                self.current_host = Some(host.clone());
            }
            Event::Log { .. } => {}
            Event::HostDone(outcome) => {
                self.completed = self.completed.saturating_add(1).min(self.total);
                match outcome.status {
                    HostStatus::Success => self.succeeded += 1,
                    HostStatus::ConnectionFailed | HostStatus::OperationFailed => self.failed += 1,
                    HostStatus::Cancelled => self.cancelled += 1,
                    HostStatus::Skipped => self.skipped += 1,
                }
            }
            Event::RunDone(_) => {
                self.current_host = None;
                self.finished = true;
            }
        }
    }
}

/// Worker-side handle for posting events onto the result channel.
///
/// Sending never blocks and silently drops events once the consumer is gone;
/// a run keeps winding down and returns its summary even if nobody is
/// listening any more.
#[derive(Clone, Debug)]
pub struct EventSender {
    sender: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Posts a progress event.
    pub fn progress(&self, host: impl Into<String>, phase: Phase) {
        self.send(Event::Progress {
            host: host.into(),
            phase,
        });
    }

    /// Posts a log event.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.send(Event::Log {
            level,
            message: message.into(),
        });
    }

    /// Posts a host's terminal outcome.
    pub fn host_done(&self, outcome: HostOutcome) {
        self.send(Event::HostDone(outcome));
    }

    /// Posts the final run summary.
    pub fn run_done(&self, summary: RunSummary) {
        self.send(Event::RunDone(summary));
    }

    fn send(&self, event: Event) {
        self.sender.send(event).ok();
    }
}

/// Creates the result channel: a sender for workers and the receiver drained
/// by the single consumer.
#[must_use]
pub fn result_channel() -> (EventSender, mpsc::UnboundedReceiver<Event>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (EventSender { sender }, receiver)
}

#[cfg(test)]
mod tests;
