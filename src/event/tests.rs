//! Unit tests for the event model and run state bookkeeping.

use rstest::rstest;

use super::*;

fn outcome(status: HostStatus) -> HostOutcome {
    HostOutcome::failure("main", status, "detail")
}

#[rstest]
#[case(Phase::Probing, "probing")]
#[case(Phase::Executing(0), "step 1")]
#[case(Phase::Executing(2), "step 3")]
#[case(Phase::Downloading, "downloading")]
#[case(Phase::Cleanup, "cleanup")]
fn phase_display_is_human_readable(#[case] phase: Phase, #[case] expected: &str) {
    assert_eq!(phase.to_string(), expected);
}

#[test]
fn summary_counts_partition_totals() {
    let outcomes = vec![
        HostOutcome::success("a", Vec::new()),
        outcome(HostStatus::ConnectionFailed),
        outcome(HostStatus::OperationFailed),
        HostOutcome::cancelled("d"),
        HostOutcome::skipped("e"),
    ];
    let summary = RunSummary::from_outcomes(5, outcomes);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.cancelled, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(
        summary.succeeded + summary.failed + summary.cancelled + summary.skipped,
        summary.total
    );
    assert!(!summary.is_success());
}

#[test]
fn summary_with_only_successes_and_skips_is_success() {
    let outcomes = vec![
        HostOutcome::success("a", Vec::new()),
        HostOutcome::skipped("b"),
    ];
    let summary = RunSummary::from_outcomes(2, outcomes);
    assert!(summary.is_success());
}

#[test]
fn run_state_completed_is_monotonic_and_capped() {
    let mut state = RunState::new(2);
    state.apply(&Event::HostDone(HostOutcome::success("a", Vec::new())));
    assert_eq!(state.completed, 1);
    state.apply(&Event::HostDone(outcome(HostStatus::OperationFailed)));
    assert_eq!(state.completed, 2);
    // A stray extra terminal event must not push completed past total.
    state.apply(&Event::HostDone(outcome(HostStatus::OperationFailed)));
    assert_eq!(state.completed, 2);
}

#[test]
fn run_state_tracks_current_host_until_run_done() {
    let mut state = RunState::new(1);
    state.apply(&Event::Progress {
        host: String::from("main"),
        phase: Phase::Probing,
    });
    assert_eq!(state.current_host.as_deref(), Some("main"));
    state.apply(&Event::RunDone(RunSummary::from_outcomes(1, Vec::new())));
    assert!(state.current_host.is_none());
    assert!(state.finished);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_producers_one_consumer_loses_nothing() {
    let (sender, mut receiver) = result_channel();
    let workers = 8;
    let per_worker = 50;
    let mut handles = Vec::new();
    for worker in 0..workers {
        let sender = sender.clone();
        handles.push(tokio::spawn(async move {
            for step in 0..per_worker {
                sender.log(LogLevel::Info, format!("worker {worker} step {step}"));
            }
            sender.host_done(HostOutcome::success(format!("host-{worker}"), Vec::new()));
        }));
    }
    for handle in handles {
        handle.await.expect("worker should not panic");
    }
    drop(sender);

    let mut state = RunState::new(workers);
    let mut logs = 0;
    while let Some(event) = receiver.recv().await {
        if matches!(event, Event::Log { .. }) {
            logs += 1;
        }
        state.apply(&event);
    }
    assert_eq!(logs, workers * per_worker);
    assert_eq!(state.completed, workers);
    assert_eq!(state.succeeded, workers);
}

#[test]
fn sending_after_receiver_drop_is_silent() {
    let (sender, receiver) = result_channel();
    drop(receiver);
    sender.log(LogLevel::Info, "nobody listening");
    sender.host_done(HostOutcome::success("a", Vec::new()));
}
