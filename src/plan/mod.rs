//! Operation plans: the ordered remote steps executed against each host.
//!
//! A plan is immutable and supplied by the caller. Each step carries a remote
//! command, the artifacts it is expected to produce, and an optional success
//! predicate over the captured output. Remote shell pipelines can exit zero
//! while failing to produce their artifacts, so the predicate decides success
//! where the exit code is not enough.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::transport::ExecOutput;

/// Predicate deciding whether a step's captured output counts as success.
pub type StepCheck = Arc<dyn Fn(&ExecOutput) -> bool + Send + Sync>;

/// A remote file produced by a step and retrieved after it succeeds.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArtifactSpec {
    /// Absolute path of the file on the remote host.
    pub remote_path: String,
    /// Local file name the artifact is saved under, prefixed with the host
    /// name to keep a fleet's downloads apart.
    pub local_name: String,
}

impl ArtifactSpec {
    /// Creates an artifact spec, trimming both fields.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::Validation`] when either field is empty after
    /// trimming.
    pub fn new(
        remote_path: impl Into<String>,
        local_name: impl Into<String>,
    ) -> Result<Self, PlanError> {
        let remote_path = remote_path.into().trim().to_owned();
        let local_name = local_name.into().trim().to_owned();
        if remote_path.is_empty() {
            return Err(PlanError::Validation(String::from("artifact remote_path")));
        }
        if local_name.is_empty() {
            return Err(PlanError::Validation(String::from("artifact local_name")));
        }
        Ok(Self {
            remote_path,
            local_name,
        })
    }
}

/// One remote command plus the artifacts it is expected to produce.
#[derive(Clone)]
pub struct OperationStep {
    command: String,
    artifacts: Vec<ArtifactSpec>,
    check: Option<StepCheck>,
}

impl OperationStep {
    /// Creates a step with no artifacts and the default zero-exit check.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::Validation`] when the command is empty after
    /// trimming.
    pub fn new(command: impl Into<String>) -> Result<Self, PlanError> {
        let command = command.into().trim().to_owned();
        if command.is_empty() {
            return Err(PlanError::Validation(String::from("step command")));
        }
        Ok(Self {
            command,
            artifacts: Vec::new(),
            check: None,
        })
    }

    /// Adds an expected artifact to the step.
    #[must_use]
    pub fn with_artifact(mut self, artifact: ArtifactSpec) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Replaces the default zero-exit success check with a caller predicate.
    #[must_use]
    pub fn with_check(mut self, check: StepCheck) -> Self {
        self.check = Some(check);
        self
    }

    /// Returns the remote command text.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns the artifacts this step is expected to produce.
    #[must_use]
    pub fn artifacts(&self) -> &[ArtifactSpec] {
        &self.artifacts
    }

    /// Decides whether the captured output counts as success.
    ///
    /// Without a caller predicate a zero exit code is success.
    #[must_use]
    pub fn succeeded(&self, output: &ExecOutput) -> bool {
        self.check
            .as_ref()
            .map_or_else(|| output.is_success(), |check| check(output))
    }
}

impl fmt::Debug for OperationStep {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("OperationStep")
            .field("command", &self.command)
            .field("artifacts", &self.artifacts)
            .field("has_check", &self.check.is_some())
            .finish()
    }
}

/// The immutable ordered sequence of steps run against each host.
#[derive(Clone, Debug)]
pub struct OperationPlan {
    steps: Vec<OperationStep>,
    cleanup: Option<String>,
}

impl OperationPlan {
    /// Starts a builder for an [`OperationPlan`].
    #[must_use]
    pub fn builder() -> OperationPlanBuilder {
        OperationPlanBuilder::default()
    }

    /// Returns the steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[OperationStep] {
        &self.steps
    }

    /// Returns the cleanup command run after the main steps, if any.
    #[must_use]
    pub fn cleanup(&self) -> Option<&str> {
        self.cleanup.as_deref()
    }
}

/// Builder for [`OperationPlan`] that defers validation to construction.
#[derive(Clone, Debug, Default)]
pub struct OperationPlanBuilder {
    steps: Vec<OperationStep>,
    cleanup: Option<String>,
}

impl OperationPlanBuilder {
    /// Appends a step to the plan.
    #[must_use]
    pub fn step(mut self, step: OperationStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Sets the cleanup command, always attempted after the main steps.
    #[must_use]
    pub fn cleanup(mut self, command: impl Into<String>) -> Self {
        self.cleanup = Some(command.into());
        self
    }

    /// Builds the plan.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::Validation`] when the plan has no steps or the
    /// cleanup command is blank.
    pub fn build(self) -> Result<OperationPlan, PlanError> {
        if self.steps.is_empty() {
            return Err(PlanError::Validation(String::from("steps")));
        }
        let cleanup = match self.cleanup {
            None => None,
            Some(command) => {
                let trimmed = command.trim().to_owned();
                if trimmed.is_empty() {
                    return Err(PlanError::Validation(String::from("cleanup command")));
                }
                Some(trimmed)
            }
        };
        Ok(OperationPlan {
            steps: self.steps,
            cleanup,
        })
    }
}

/// Errors raised while building an operation plan.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PlanError {
    /// Raised when a required value is missing or empty.
    #[error("missing or empty field: {0}")]
    Validation(String),
}
