//! Per-run output directory and the plain-text run report.
//!
//! Each run writes its artifacts and `report.txt` into a fresh directory
//! under the configured output root, so consecutive runs never clobber each
//! other's downloads.

use std::fmt::Write as _;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::event::RunSummary;

/// File name of the run report inside the run directory.
pub const REPORT_FILE_NAME: &str = "report.txt";

/// Errors raised while preparing the run directory or writing the report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Creates the per-run directory `<output_dir>/run-<run_id>`.
///
/// Intermediate directories are created as needed.
///
/// # Errors
///
/// Returns [`ReportError::Io`] when the directory cannot be created.
pub fn prepare_run_dir(output_dir: &Utf8Path, run_id: &str) -> Result<Utf8PathBuf, ReportError> {
    let run_dir = output_dir.join(format!("run-{run_id}"));
    Dir::create_ambient_dir_all(&run_dir, ambient_authority()).map_err(|err| ReportError::Io {
        path: run_dir.clone(),
        message: err.to_string(),
    })?;
    Ok(run_dir)
}

/// Writes `report.txt` into the run directory and returns its path.
///
/// # Errors
///
/// Returns [`ReportError::Io`] when the report cannot be written.
pub fn write_report(
    run_dir: &Utf8Path,
    run_id: &str,
    summary: &RunSummary,
) -> Result<Utf8PathBuf, ReportError> {
    let rendered = render_report(run_id, summary);
    let dir = Dir::open_ambient_dir(run_dir, ambient_authority()).map_err(|err| ReportError::Io {
        path: run_dir.to_path_buf(),
        message: err.to_string(),
    })?;
    let path = run_dir.join(REPORT_FILE_NAME);
    dir.write(REPORT_FILE_NAME, rendered)
        .map_err(|err| ReportError::Io {
            path: path.clone(),
            message: err.to_string(),
        })?;
    Ok(path)
}

fn render_report(run_id: &str, summary: &RunSummary) -> String {
    let mut out = String::new();
    writeln!(out, "armada run report").ok();
    writeln!(out, "run id: {run_id}").ok();
    if let Ok(generated) = OffsetDateTime::now_utc().format(&Rfc3339) {
        writeln!(out, "generated: {generated}").ok();
    }
    writeln!(
        out,
        "hosts: {} total, {} succeeded, {} failed, {} cancelled, {} skipped",
        summary.total, summary.succeeded, summary.failed, summary.cancelled, summary.skipped
    )
    .ok();

    for outcome in &summary.outcomes {
        writeln!(out).ok();
        writeln!(out, "host: {}", outcome.host).ok();
        writeln!(out, "status: {}", outcome.status).ok();
        if !outcome.detail.is_empty() {
            writeln!(out, "detail: {}", outcome.detail).ok();
        }
        if !outcome.artifacts.is_empty() {
            writeln!(out, "artifacts:").ok();
            for artifact in &outcome.artifacts {
                writeln!(out, "  {artifact}").ok();
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::event::{HostOutcome, HostStatus};

    fn temp_root(tmp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("non-utf8 tempdir: {}", path.display()))
    }

    fn sample_summary() -> RunSummary {
        RunSummary::from_outcomes(
            3,
            vec![
                HostOutcome::success("main", vec![Utf8PathBuf::from("/tmp/out/main_dump.log")]),
                HostOutcome::failure(
                    "backup",
                    HostStatus::ConnectionFailed,
                    "probe failed: Connection refused",
                ),
                HostOutcome::skipped("lab"),
            ],
        )
    }

    #[test]
    fn prepare_run_dir_creates_nested_directories() {
        let tmp = TempDir::new().expect("tempdir");
        let root = temp_root(&tmp).join("deep/runs");
        let run_dir = prepare_run_dir(&root, "abc123").expect("run dir");
        assert_eq!(run_dir, root.join("run-abc123"));
        assert!(run_dir.as_std_path().is_dir());
    }

    #[test]
    fn report_lists_counts_outcomes_and_artifacts() {
        let tmp = TempDir::new().expect("tempdir");
        let run_dir = prepare_run_dir(&temp_root(&tmp), "abc123").expect("run dir");
        let path = write_report(&run_dir, "abc123", &sample_summary()).expect("report");

        let rendered = std::fs::read_to_string(path.as_std_path()).expect("read report");
        assert!(rendered.contains("run id: abc123"));
        assert!(rendered.contains("hosts: 3 total, 1 succeeded, 1 failed, 0 cancelled, 1 skipped"));
        assert!(rendered.contains("host: main\nstatus: success"));
        assert!(rendered.contains("/tmp/out/main_dump.log"));
        assert!(rendered.contains("detail: probe failed: Connection refused"));
        assert!(rendered.contains("status: skipped"));
    }

    #[test]
    fn write_report_fails_for_missing_directory() {
        let tmp = TempDir::new().expect("tempdir");
        let missing = temp_root(&tmp).join("does-not-exist");
        let err = write_report(&missing, "abc123", &sample_summary())
            .expect_err("missing directory should fail");
        assert!(matches!(err, ReportError::Io { .. }));
    }
}
