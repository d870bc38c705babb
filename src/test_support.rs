//! Test support utilities shared across unit and integration tests.

use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use crate::transport::{CommandRunner, ExecOutput, Transport, TransportError, TransportFuture};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic client invocations without spawning
/// processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<Result<ExecOutput, TransportError>>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Timeout applied to the call.
    pub timeout: Duration,
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a specific exit code with empty output.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(ExecOutput {
                exit_code: code,
                stdout: stdout.into(),
                stderr: stderr.into(),
            }));
    }

    /// Pushes a transport error response.
    pub fn push_error(&self, error: TransportError) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(error));
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [OsString],
        timeout: Duration,
    ) -> TransportFuture<'a, ExecOutput> {
        Box::pin(async move {
            self.invocations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(CommandInvocation {
                    program: program.to_owned(),
                    args: args.to_vec(),
                    timeout,
                });
            self.responses
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .ok_or_else(|| TransportError::Spawn {
                    program: program.to_owned(),
                    message: String::from("no scripted response available"),
                })?
        })
    }
}

/// Records a single call made through [`ScriptedTransport`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransportCall {
    /// A remote command execution.
    Exec {
        /// Login target the call was made against.
        target: String,
        /// Remote command text.
        command: String,
    },
    /// A file retrieval.
    Fetch {
        /// Login target the call was made against.
        target: String,
        /// Remote path requested.
        remote_path: String,
        /// Local destination path.
        local_path: Utf8PathBuf,
    },
}

#[derive(Debug)]
enum ScriptedReply {
    Exec {
        delay: Option<Duration>,
        result: Result<ExecOutput, TransportError>,
    },
    Fetch {
        delay: Option<Duration>,
        result: Result<(), TransportError>,
    },
}

#[derive(Debug, Default)]
struct ScriptState {
    by_target: HashMap<String, VecDeque<ScriptedReply>>,
    shared: VecDeque<ScriptedReply>,
    calls: Vec<TransportCall>,
}

/// Scripted transport returning pre-seeded responses and recording calls.
///
/// Responses queued for a specific target take priority over the shared
/// queue, which lets concurrent tests script per-host behaviour (such as a
/// deliberately slow host) deterministically.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    /// Creates a transport with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
            .clone()
    }

    /// Returns the exec commands recorded for `target`, in call order.
    #[must_use]
    pub fn exec_commands_for(&self, target: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Exec {
                    target: seen,
                    command,
                } if seen == target => Some(command),
                _ => None,
            })
            .collect()
    }

    /// Queues a successful exec on the shared queue.
    pub fn push_exec_success(&self) {
        self.push_shared(exec_reply(None, Ok(success_output())));
    }

    /// Queues an exec with a specific exit code on the shared queue.
    pub fn push_exec_exit(&self, code: i32) {
        self.push_shared(exec_reply(None, Ok(failure_output(code))));
    }

    /// Queues an exec with explicit output on the shared queue.
    pub fn push_exec_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.push_shared(exec_reply(
            None,
            Ok(ExecOutput {
                exit_code: code,
                stdout: stdout.into(),
                stderr: stderr.into(),
            }),
        ));
    }

    /// Queues an exec transport error on the shared queue.
    pub fn push_exec_error(&self, error: TransportError) {
        self.push_shared(exec_reply(None, Err(error)));
    }

    /// Queues a successful fetch on the shared queue.
    pub fn push_fetch_success(&self) {
        self.push_shared(ScriptedReply::Fetch {
            delay: None,
            result: Ok(()),
        });
    }

    /// Queues a fetch transport error on the shared queue.
    pub fn push_fetch_error(&self, error: TransportError) {
        self.push_shared(ScriptedReply::Fetch {
            delay: None,
            result: Err(error),
        });
    }

    /// Queues a successful exec for a specific target.
    pub fn push_exec_success_for(&self, target: &str) {
        self.push_for(target, exec_reply(None, Ok(success_output())));
    }

    /// Queues an exec with a specific exit code for a specific target.
    pub fn push_exec_exit_for(&self, target: &str, code: i32) {
        self.push_for(target, exec_reply(None, Ok(failure_output(code))));
    }

    /// Queues an exec with explicit output for a specific target.
    pub fn push_exec_output_for(
        &self,
        target: &str,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.push_for(
            target,
            exec_reply(
                None,
                Ok(ExecOutput {
                    exit_code: code,
                    stdout: stdout.into(),
                    stderr: stderr.into(),
                }),
            ),
        );
    }

    /// Queues a successful exec for a target, delivered after `delay`.
    pub fn push_delayed_exec_success_for(&self, target: &str, delay: Duration) {
        self.push_for(target, exec_reply(Some(delay), Ok(success_output())));
    }

    /// Queues a successful fetch for a specific target.
    pub fn push_fetch_success_for(&self, target: &str) {
        self.push_for(
            target,
            ScriptedReply::Fetch {
                delay: None,
                result: Ok(()),
            },
        );
    }

    fn push_shared(&self, reply: ScriptedReply) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .shared
            .push_back(reply);
    }

    fn push_for(&self, target: &str, reply: ScriptedReply) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_target
            .entry(target.to_owned())
            .or_default()
            .push_back(reply);
    }

    fn pop(&self, target: &str, call: TransportCall) -> Option<ScriptedReply> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.calls.push(call);
        state
            .by_target
            .get_mut(target)
            .and_then(VecDeque::pop_front)
            .or_else(|| state.shared.pop_front())
    }
}

const fn exec_reply(
    delay: Option<Duration>,
    result: Result<ExecOutput, TransportError>,
) -> ScriptedReply {
    ScriptedReply::Exec { delay, result }
}

fn success_output() -> ExecOutput {
    ExecOutput {
        exit_code: Some(0),
        stdout: String::new(),
        stderr: String::new(),
    }
}

fn failure_output(code: i32) -> ExecOutput {
    ExecOutput {
        exit_code: Some(code),
        stdout: String::new(),
        stderr: String::from("simulated failure"),
    }
}

fn exhausted(target: &str) -> TransportError {
    TransportError::Spawn {
        program: String::from("scripted"),
        message: format!("no scripted response available for {target}"),
    }
}

fn kind_mismatch(target: &str) -> TransportError {
    TransportError::Spawn {
        program: String::from("scripted"),
        message: format!("scripted response kind mismatch for {target}"),
    }
}

impl Transport for ScriptedTransport {
    fn exec<'a>(
        &'a self,
        target: &'a str,
        command: &'a str,
        _timeout: Duration,
    ) -> TransportFuture<'a, ExecOutput> {
        Box::pin(async move {
            let reply = self.pop(
                target,
                TransportCall::Exec {
                    target: target.to_owned(),
                    command: command.to_owned(),
                },
            );
            match reply {
                Some(ScriptedReply::Exec { delay, result }) => {
                    if let Some(pause) = delay {
                        tokio::time::sleep(pause).await;
                    }
                    result
                }
                Some(ScriptedReply::Fetch { .. }) => Err(kind_mismatch(target)),
                None => Err(exhausted(target)),
            }
        })
    }

    fn fetch<'a>(
        &'a self,
        target: &'a str,
        remote_path: &'a str,
        local_path: &'a Utf8Path,
        _timeout: Duration,
    ) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let reply = self.pop(
                target,
                TransportCall::Fetch {
                    target: target.to_owned(),
                    remote_path: remote_path.to_owned(),
                    local_path: local_path.to_owned(),
                },
            );
            match reply {
                Some(ScriptedReply::Fetch { delay, result }) => {
                    if let Some(pause) = delay {
                        tokio::time::sleep(pause).await;
                    }
                    result
                }
                Some(ScriptedReply::Exec { .. }) => Err(kind_mismatch(target)),
                None => Err(exhausted(target)),
            }
        })
    }
}
