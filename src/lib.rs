//! Core library for the Armada fleet orchestration tool.
//!
//! The crate runs one operation plan across a fleet of SSH hosts: probe the
//! connection, execute the plan's remote steps, download the artifacts they
//! produce, and clean up, with bounded concurrency and cooperative
//! cancellation. Progress flows to a single consumer over the result
//! channel.

pub mod cancel;
pub mod config;
pub mod event;
pub mod host;
pub mod orchestrator;
pub mod pipeline;
pub mod plan;
pub mod probe;
pub mod report;
pub mod test_support;
pub mod transport;

pub use cancel::CancelToken;
pub use config::{ConfigError, ConfigLoadError, FleetConfig};
pub use event::{
    Event, EventSender, HostOutcome, HostStatus, LogLevel, Phase, RunState, RunSummary,
    result_channel,
};
pub use host::{Credentials, Fleet, Host, HostError};
pub use orchestrator::{FleetError, FleetOrchestrator};
pub use pipeline::HostPipeline;
pub use plan::{ArtifactSpec, OperationPlan, OperationStep, PlanError, StepCheck};
pub use probe::{PROBE_COMMAND, ProbeOutcome, probe};
pub use report::{REPORT_FILE_NAME, ReportError, prepare_run_dir, write_report};
pub use transport::{
    CommandRunner, ExecOutput, ProcessCommandRunner, SshTransport, Transport, TransportError,
    TransportFuture,
};
