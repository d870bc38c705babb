//! Connection probe run before any operation is attempted on a host.

use std::time::Duration;

use crate::transport::Transport;

/// Command run on the remote host to verify reachability. It does nothing
/// and exits zero, so a non-zero exit can only mean the connection itself
/// failed.
pub const PROBE_COMMAND: &str = "true";

/// Result of probing one host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProbeOutcome {
    /// The host accepted a connection and ran the probe command.
    Reachable,
    /// The host could not be reached within the probe timeout.
    Unreachable {
        /// Diagnostic suitable for the host's outcome record.
        reason: String,
    },
}

impl ProbeOutcome {
    /// Returns `true` for [`ProbeOutcome::Reachable`].
    #[must_use]
    pub const fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable)
    }
}

/// Probes `target` by running [`PROBE_COMMAND`] under `timeout`.
///
/// Transport errors and non-zero exits both map to
/// [`ProbeOutcome::Unreachable`]; the probe never fails the caller.
pub async fn probe<T: Transport>(transport: &T, target: &str, timeout: Duration) -> ProbeOutcome {
    match transport.exec(target, PROBE_COMMAND, timeout).await {
        Ok(output) if output.is_success() => ProbeOutcome::Reachable,
        Ok(output) => {
            let detail = output.stderr.trim();
            let reason = if detail.is_empty() {
                format!("probe exited with {:?}", output.exit_code)
            } else {
                format!("probe failed: {detail}")
            };
            ProbeOutcome::Unreachable { reason }
        }
        Err(err) => ProbeOutcome::Unreachable {
            reason: err.to_string(),
        },
    }
}
