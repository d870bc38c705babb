//! Unit tests for fleet fan-out, ordering, and cancellation.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::rstest;
use tokio::sync::mpsc::UnboundedReceiver;

use super::*;
use crate::event::Event;
use crate::plan::OperationStep;
use crate::test_support::ScriptedTransport;
use crate::transport::ExecOutput;

fn config(concurrency: usize) -> Arc<FleetConfig> {
    Arc::new(FleetConfig {
        ssh_bin: String::from("ssh"),
        scp_bin: String::from("scp"),
        ssh_user: String::from("ops"),
        ssh_identity_file: None,
        ssh_batch_mode: true,
        ssh_strict_host_key_checking: false,
        ssh_known_hosts_file: String::from("/dev/null"),
        probe_timeout_secs: 5,
        command_timeout_secs: 60,
        transfer_timeout_secs: 120,
        cleanup_timeout_secs: 10,
        concurrency,
        output_dir: String::from("armada-runs"),
    })
}

fn fleet_of(names: &[&str]) -> Fleet {
    let hosts = names
        .iter()
        .enumerate()
        .map(|(index, name)| Host::new(*name, format!("10.0.0.{}", index + 1)).expect("host"))
        .collect();
    Fleet::new(hosts).expect("fleet")
}

fn credentials() -> Credentials {
    Credentials::new("ops", None).expect("credentials")
}

fn single_step_plan() -> Arc<OperationPlan> {
    Arc::new(
        OperationPlan::builder()
            .step(OperationStep::new("uptime").expect("step"))
            .build()
            .expect("plan"),
    )
}

fn statuses(summary: &RunSummary) -> Vec<HostStatus> {
    summary.outcomes.iter().map(|outcome| outcome.status).collect()
}

fn drain(mut receiver: UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

#[rstest]
#[tokio::test]
async fn summary_counts_partition_the_fleet() {
    let transport = ScriptedTransport::new();
    // reachable: probe + step succeed
    transport.push_exec_success_for("ops@10.0.0.1");
    transport.push_exec_success_for("ops@10.0.0.1");
    // broken: probe fails
    transport.push_exec_exit_for("ops@10.0.0.2", 255);

    let mut fleet = fleet_of(&["reachable", "broken", "benched"]);
    fleet
        .skip_hosts(&[String::from("benched")])
        .expect("known host");

    let orchestrator = FleetOrchestrator::new(Arc::new(transport), config(1));
    let (events, receiver) = crate::event::result_channel();
    let summary = orchestrator
        .run(
            &fleet,
            &credentials(),
            single_step_plan(),
            &Utf8PathBuf::from("/tmp/out"),
            CancelToken::new(),
            events,
        )
        .await
        .expect("run should start");

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.cancelled, 0);
    assert_eq!(
        statuses(&summary),
        vec![
            HostStatus::Success,
            HostStatus::ConnectionFailed,
            HostStatus::Skipped,
        ],
        "concurrency one preserves host table order"
    );

    let events = drain(receiver);
    let host_done = events
        .iter()
        .filter(|event| matches!(event, Event::HostDone(_)))
        .count();
    let run_done = events
        .iter()
        .filter(|event| matches!(event, Event::RunDone(_)))
        .count();
    assert_eq!(host_done, 3, "exactly one terminal event per host");
    assert_eq!(run_done, 1, "the final summary is emitted exactly once");
}

#[rstest]
#[tokio::test]
async fn cancellation_mid_run_marks_remaining_hosts_cancelled() {
    let transport = ScriptedTransport::new();
    // Sequential call order: a probe, a step, b probe, b step.
    transport.push_exec_success();
    transport.push_exec_success();
    transport.push_exec_success();
    transport.push_exec_output(Some(0), "cancel-now", "");

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let step = OperationStep::new("uptime")
        .expect("step")
        .with_check(Arc::new(move |output: &ExecOutput| {
            if output.stdout == "cancel-now" {
                trigger.cancel();
            }
            output.is_success()
        }));
    let plan = Arc::new(OperationPlan::builder().step(step).build().expect("plan"));

    let fleet = fleet_of(&["a", "b", "c", "d", "e"]);
    let orchestrator = FleetOrchestrator::new(Arc::new(transport), config(1));
    let (events, _receiver) = crate::event::result_channel();
    let summary = orchestrator
        .run(
            &fleet,
            &credentials(),
            plan,
            &Utf8PathBuf::from("/tmp/out"),
            cancel,
            events,
        )
        .await
        .expect("run should start");

    assert_eq!(
        statuses(&summary),
        vec![
            HostStatus::Success,
            HostStatus::Success,
            HostStatus::Cancelled,
            HostStatus::Cancelled,
            HostStatus::Cancelled,
        ]
    );
    assert_eq!(summary.succeeded + summary.cancelled, summary.total);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_outcomes_arrive_in_completion_order() {
    let transport = ScriptedTransport::new();
    for fast in ["ops@10.0.0.1", "ops@10.0.0.2"] {
        transport.push_exec_success_for(fast); // probe
        transport.push_exec_success_for(fast); // step
    }
    transport.push_delayed_exec_success_for("ops@10.0.0.3", Duration::from_millis(200));
    transport.push_exec_success_for("ops@10.0.0.3");

    let fleet = fleet_of(&["fast-one", "fast-two", "slow"]);
    let orchestrator = FleetOrchestrator::new(Arc::new(transport), config(3));
    let (events, _receiver) = crate::event::result_channel();
    let summary = orchestrator
        .run(
            &fleet,
            &credentials(),
            single_step_plan(),
            &Utf8PathBuf::from("/tmp/out"),
            CancelToken::new(),
            events,
        )
        .await
        .expect("run should start");

    assert_eq!(summary.succeeded, 3);
    assert_eq!(
        summary.outcomes.last().map(|outcome| outcome.host.as_str()),
        Some("slow"),
        "the slow host must finish last: {:?}",
        summary.outcomes.iter().map(|o| o.host.clone()).collect::<Vec<_>>()
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panicking_pipeline_still_yields_one_outcome() {
    let transport = ScriptedTransport::new();
    transport.push_exec_success_for("ops@10.0.0.1"); // probe
    transport.push_exec_success_for("ops@10.0.0.1"); // step
    transport.push_exec_success_for("ops@10.0.0.2"); // probe
    transport.push_exec_output_for("ops@10.0.0.2", Some(0), "boom", "");

    let step = OperationStep::new("uptime")
        .expect("step")
        .with_check(Arc::new(|output: &ExecOutput| {
            assert!(output.stdout != "boom", "deliberate panic for the abort path");
            output.is_success()
        }));
    let plan = Arc::new(OperationPlan::builder().step(step).build().expect("plan"));

    let fleet = fleet_of(&["good", "bad"]);
    let orchestrator = FleetOrchestrator::new(Arc::new(transport), config(2));
    let (events, receiver) = crate::event::result_channel();
    let summary = orchestrator
        .run(
            &fleet,
            &credentials(),
            plan,
            &Utf8PathBuf::from("/tmp/out"),
            CancelToken::new(),
            events,
        )
        .await
        .expect("run should start");

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    let aborted = summary
        .outcomes
        .iter()
        .find(|outcome| outcome.host == "bad")
        .expect("bad host outcome");
    assert_eq!(aborted.status, HostStatus::OperationFailed);
    assert!(aborted.detail.contains("pipeline aborted"));

    let host_done = drain(receiver)
        .iter()
        .filter(|event| matches!(event, Event::HostDone(_)))
        .count();
    assert_eq!(host_done, 2);
}

#[rstest]
#[tokio::test]
async fn identical_runs_produce_identical_summaries() {
    let fleet = fleet_of(&["a", "b"]);
    let mut summaries = Vec::new();
    for _ in 0..2 {
        let transport = ScriptedTransport::new();
        transport.push_exec_success_for("ops@10.0.0.1");
        transport.push_exec_success_for("ops@10.0.0.1");
        transport.push_exec_exit_for("ops@10.0.0.2", 255);
        let orchestrator = FleetOrchestrator::new(Arc::new(transport), config(1));
        let (events, _receiver) = crate::event::result_channel();
        let summary = orchestrator
            .run(
                &fleet,
                &credentials(),
                single_step_plan(),
                &Utf8PathBuf::from("/tmp/out"),
                CancelToken::new(),
                events,
            )
            .await
            .expect("run should start");
        summaries.push(summary);
    }
    assert_eq!(summaries[0], summaries[1]);
}

#[rstest]
#[tokio::test]
async fn empty_fleet_is_rejected() {
    let orchestrator = FleetOrchestrator::new(Arc::new(ScriptedTransport::new()), config(1));
    let (events, _receiver) = crate::event::result_channel();
    let err = orchestrator
        .run(
            &Fleet::default(),
            &credentials(),
            single_step_plan(),
            &Utf8PathBuf::from("/tmp/out"),
            CancelToken::new(),
            events,
        )
        .await
        .expect_err("empty fleet must be rejected");
    assert_eq!(err, FleetError::EmptyFleet);
}

#[rstest]
#[tokio::test]
async fn pre_cancelled_run_is_rejected() {
    let orchestrator = FleetOrchestrator::new(Arc::new(ScriptedTransport::new()), config(1));
    let (events, _receiver) = crate::event::result_channel();
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = orchestrator
        .run(
            &fleet_of(&["a"]),
            &credentials(),
            single_step_plan(),
            &Utf8PathBuf::from("/tmp/out"),
            cancel,
            events,
        )
        .await
        .expect_err("pre-cancelled run must be rejected");
    assert_eq!(err, FleetError::AlreadyCancelled);
}
