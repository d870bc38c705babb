//! Fleet configuration structures and validation.
//!
//! This module defines [`FleetConfig`] for SSH client settings, per-phase
//! timeouts, and concurrency, along with associated error types.
//! Configuration is loaded via `ortho-config` which merges defaults,
//! configuration files, and environment variables.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default directory receiving per-run output directories.
pub const DEFAULT_OUTPUT_DIR: &str = "armada-runs";

/// SSH, timeout, and concurrency settings loaded via `ortho-config`.
///
/// Probing, command execution, artifact transfer, and cleanup each carry
/// their own timeout: a hung remote call must never stall the fleet run, and
/// transfer time scales with artifact size while the probe should fail fast.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "ARMADA",
    discovery(
        app_name = "armada",
        env_var = "ARMADA_CONFIG_PATH",
        config_file_name = "armada.toml",
        dotfile_name = ".armada.toml",
        project_file_name = "armada.toml"
    )
)]
pub struct FleetConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `scp` executable.
    #[ortho_config(default = "scp".to_owned())]
    pub scp_bin: String,
    /// Default remote user for hosts whose address does not embed one.
    #[ortho_config(default = "root".to_owned())]
    pub ssh_user: String,
    /// Path to the SSH private key file for remote authentication. Supports
    /// tilde expansion (`~/.ssh/id_ed25519`). Optional; when not provided,
    /// SSH falls back to its default key locations or a running agent.
    pub ssh_identity_file: Option<String>,
    /// Whether to force batch mode for SSH to avoid password prompts.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking; defaults to disabling because
    /// fleet hosts are commonly reimaged.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override; defaults to `/dev/null`.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub ssh_known_hosts_file: String,
    /// Timeout in seconds for the connection probe. Deliberately short: the
    /// probe gates whether any further work is attempted on the host.
    #[ortho_config(default = 5)]
    pub probe_timeout_secs: u64,
    /// Timeout in seconds for each remote command step.
    #[ortho_config(default = 60)]
    pub command_timeout_secs: u64,
    /// Timeout in seconds for each artifact download.
    #[ortho_config(default = 120)]
    pub transfer_timeout_secs: u64,
    /// Timeout in seconds for the cleanup command.
    #[ortho_config(default = 10)]
    pub cleanup_timeout_secs: u64,
    /// Number of hosts processed concurrently; 1 means strictly sequential.
    #[ortho_config(default = 1)]
    pub concurrency: usize,
    /// Directory receiving per-run output directories.
    #[ortho_config(default = DEFAULT_OUTPUT_DIR.to_owned())]
    pub output_dir: String,
}

/// Errors raised when loading the fleet configuration from layered sources.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigLoadError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("fleet configuration parsing failed: {0}")]
    Parse(String),
}

/// Errors raised by fleet configuration validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Raised when configuration is missing required values. The error
    /// message includes guidance on how to provide the value.
    #[error("missing {field}: set ARMADA_{env_suffix} or add {field} to armada.toml", env_suffix = field.to_uppercase())]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Raised when a numeric setting is zero.
    #[error("{field} must be at least 1")]
    ZeroValue {
        /// Configuration field that failed validation.
        field: String,
    },
}

impl FleetConfig {
    /// Ensures configuration values are present after trimming whitespace
    /// and that timeouts and concurrency are non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any required field is empty or a numeric
    /// setting is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_value(&self.ssh_bin, "ssh_bin")?;
        Self::require_value(&self.scp_bin, "scp_bin")?;
        Self::require_value(&self.ssh_user, "ssh_user")?;
        Self::require_optional_value(self.ssh_identity_file.as_deref(), "ssh_identity_file")?;
        Self::require_value(&self.output_dir, "output_dir")?;
        Self::require_nonzero(self.probe_timeout_secs, "probe_timeout_secs")?;
        Self::require_nonzero(self.command_timeout_secs, "command_timeout_secs")?;
        Self::require_nonzero(self.transfer_timeout_secs, "transfer_timeout_secs")?;
        Self::require_nonzero(self.cleanup_timeout_secs, "cleanup_timeout_secs")?;
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroValue {
                field: String::from("concurrency"),
            });
        }
        Ok(())
    }

    /// Loads configuration using defaults, configuration files, and
    /// environment variables, without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("armada")])
            .map_err(|err| ConfigLoadError::Parse(err.to_string()))
    }

    /// Returns the probe timeout as a [`Duration`].
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Returns the per-step command timeout as a [`Duration`].
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Returns the artifact transfer timeout as a [`Duration`].
    #[must_use]
    pub const fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    /// Returns the cleanup timeout as a [`Duration`].
    #[must_use]
    pub const fn cleanup_timeout(&self) -> Duration {
        Duration::from_secs(self.cleanup_timeout_secs)
    }

    fn require_optional_value(value: Option<&str>, field: &str) -> Result<(), ConfigError> {
        match value {
            None => Ok(()), // Not configured; SSH uses defaults
            Some(v) if !v.trim().is_empty() => Ok(()),
            Some(_) => Err(ConfigError::InvalidConfig {
                field: field.to_owned(),
            }),
        }
    }

    fn require_value(value: &str, field: &str) -> Result<(), ConfigError> {
        Self::require_optional_value(Some(value), field)
    }

    fn require_nonzero(value: u64, field: &str) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::ZeroValue {
                field: field.to_owned(),
            });
        }
        Ok(())
    }
}
