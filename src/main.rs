//! Binary entry point for the Armada fleet CLI.

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use camino::Utf8Path;
use clap::Parser;
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use uuid::Uuid;

use armada::{
    ArtifactSpec, CancelToken, Credentials, Event, Fleet, FleetConfig, FleetError,
    FleetOrchestrator, OperationPlan, OperationStep, ReportError, RunState, SshTransport,
    prepare_run_dir, result_channel, write_report,
};

mod cli;

use cli::{Cli, RunCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("host table error: {0}")]
    Hosts(String),
    #[error("invalid plan: {0}")]
    Plan(String),
    #[error("invalid artifact spec: {0}")]
    Artifact(String),
    #[error("report error: {0}")]
    Report(#[from] ReportError),
    #[error("fleet run rejected: {0}")]
    Fleet(#[from] FleetError),
    #[error("fleet run aborted: {0}")]
    Aborted(String),
    #[error("invalid command argument: {0}")]
    InvalidCommand(String),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Run(command) => run_command(command).await,
    }
}

async fn run_command(args: RunCommand) -> Result<i32, CliError> {
    let mut config =
        FleetConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    if let Some(limit) = args.concurrency {
        config.concurrency = limit;
    }
    config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;

    let table = std::fs::read_to_string(args.hosts.as_std_path())
        .map_err(|err| CliError::Hosts(format!("{}: {err}", args.hosts)))?;
    let mut fleet =
        Fleet::from_json_table(&table).map_err(|err| CliError::Hosts(err.to_string()))?;
    fleet
        .skip_hosts(&args.skip)
        .map_err(|err| CliError::Hosts(err.to_string()))?;

    validate_command_args(&args.commands)?;
    let plan = Arc::new(build_plan(&args)?);

    let credentials = Credentials::new(config.ssh_user.clone(), config.ssh_identity_file.clone())
        .map_err(|err| CliError::Config(err.to_string()))?;

    let run_id = Uuid::new_v4().to_string();
    let run_dir = prepare_run_dir(Utf8Path::new(&config.output_dir), &run_id)?;

    let cancel = CancelToken::new();
    spawn_cancel_on_ctrl_c(cancel.clone());

    let shared_config = Arc::new(config);
    let transport = Arc::new(SshTransport::with_process_runner(
        (*shared_config).clone(),
        credentials.clone(),
    ));
    let orchestrator = FleetOrchestrator::new(transport, Arc::clone(&shared_config));

    let (events, mut receiver) = result_channel();
    let total = fleet.len();
    let worker_run_dir = run_dir.clone();
    let run = tokio::spawn(async move {
        orchestrator
            .run(&fleet, &credentials, plan, &worker_run_dir, cancel, events)
            .await
    });

    let mut state = RunState::new(total);
    let mut stderr = io::stderr();
    while let Some(event) = receiver.recv().await {
        state.apply(&event);
        render_event(&mut stderr, &event, &state);
    }

    let summary = run
        .await
        .map_err(|err| CliError::Aborted(err.to_string()))??;
    let report_path = write_report(&run_dir, &run_id, &summary)?;
    writeln!(stderr, "report written to {report_path}").ok();

    Ok(i32::from(!summary.is_success()))
}

fn spawn_cancel_on_ctrl_c(cancel: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            writeln!(io::stderr(), "cancellation requested, winding down").ok();
            cancel.cancel();
        }
    });
}

fn build_plan(args: &RunCommand) -> Result<OperationPlan, CliError> {
    let mut builder = OperationPlan::builder();
    let last = args.commands.len().saturating_sub(1);
    for (index, command) in args.commands.iter().enumerate() {
        let mut step =
            OperationStep::new(command).map_err(|err| CliError::Plan(err.to_string()))?;
        if index == last {
            // Artifacts are produced by the plan as a whole, so they are
            // collected once the final step has succeeded.
            for spec in &args.artifacts {
                step = step.with_artifact(parse_artifact(spec)?);
            }
        }
        builder = builder.step(step);
    }
    if let Some(cleanup) = &args.cleanup {
        builder = builder.cleanup(cleanup);
    }
    builder
        .build()
        .map_err(|err| CliError::Plan(err.to_string()))
}

fn parse_artifact(spec: &str) -> Result<ArtifactSpec, CliError> {
    let (remote, local) = match spec.rsplit_once(':') {
        Some((remote, local)) if !local.is_empty() => (remote.to_owned(), local.to_owned()),
        Some((remote, _)) => (remote.to_owned(), derive_local_name(remote)?),
        None => (spec.to_owned(), derive_local_name(spec)?),
    };
    ArtifactSpec::new(remote, local).map_err(|err| CliError::Artifact(err.to_string()))
}

fn derive_local_name(remote: &str) -> Result<String, CliError> {
    Utf8Path::new(remote)
        .file_name()
        .map(ToOwned::to_owned)
        .ok_or_else(|| CliError::Artifact(format!("cannot derive a local name from {remote}")))
}

fn validate_command_args(commands: &[String]) -> Result<(), CliError> {
    for command in commands {
        if command
            .chars()
            .any(|ch| matches!(ch, '\r' | '\u{0000}'..='\u{0008}' | '\u{000B}'..='\u{001F}' | '\u{007F}'))
        {
            return Err(CliError::InvalidCommand(String::from(
                "commands must not contain control characters (ASCII 0x00-0x1F or 0x7F)",
            )));
        }
    }
    Ok(())
}

fn render_event(target: &mut impl Write, event: &Event, state: &RunState) {
    let stamp = timestamp();
    match event {
        Event::Progress { host, phase } => {
            writeln!(target, "[{stamp}] {host}: {phase}").ok();
        }
        Event::Log { level, message } => {
            writeln!(target, "[{stamp}] {level}: {message}").ok();
        }
        Event::HostDone(outcome) => {
            writeln!(
                target,
                "[{stamp}] {}: {} ({}/{})",
                outcome.host, outcome.status, state.completed, state.total
            )
            .ok();
        }
        Event::RunDone(summary) => {
            writeln!(
                target,
                "[{stamp}] run finished: {} total, {} succeeded, {} failed, {} cancelled, {} skipped",
                summary.total,
                summary.succeeded,
                summary.failed,
                summary.cancelled,
                summary.skipped
            )
            .ok();
        }
    }
}

fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default()
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
