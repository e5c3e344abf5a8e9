//! Fast subtree size estimation for directories past the depth limit.

use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Computes the total size of a directory without building a tree.
///
/// Implementations never fail: anything that goes wrong, cancellation
/// included, is reported as `0`.
pub trait SizeEstimator: Send + Sync {
    /// Estimate the recursive byte size of `path`.
    fn estimate<'a>(&'a self, path: &'a Path, cancel: &'a CancellationToken) -> BoxFuture<'a, u64>;
}

#[derive(Debug, Error)]
enum EstimateError {
    #[error("failed to run du: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("du exited with {0}")]
    Status(ExitStatus),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
    #[error("unparsable du output: {0:?}")]
    Unparsable(String),
}

/// Estimator backed by the system `du -sk`.
///
/// The child process is killed if the scan is cancelled or the timeout
/// elapses while it is still running.
#[derive(Debug, Clone)]
pub struct DuEstimator {
    program: OsString,
    args: Vec<OsString>,
    timeout: Duration,
}

impl DuEstimator {
    /// Create an estimator with the given per-call timeout.
    pub fn new(timeout: Duration) -> Self {
        Self::with_command("du", ["-sk"], timeout)
    }

    /// Create an estimator running a `du -sk` compatible command.
    ///
    /// The directory path is appended after `args`. The command must print
    /// the size in KiB as the first field of its first line.
    pub fn with_command<I, S>(program: impl Into<OsString>, args: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout,
        }
    }

    async fn run(&self, path: &Path, cancel: &CancellationToken) -> Result<u64, EstimateError> {
        if cancel.is_cancelled() {
            return Err(EstimateError::Cancelled);
        }

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(EstimateError::Cancelled),
            result = tokio::time::timeout(self.timeout, child.wait_with_output()) => {
                result.map_err(|_| EstimateError::Timeout(self.timeout))??
            }
        };

        // A partial total from a failed run would understate the tree.
        if !output.status.success() {
            return Err(EstimateError::Status(output.status));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_du_output(&stdout).ok_or_else(|| EstimateError::Unparsable(stdout.into_owned()))
    }
}

impl Default for DuEstimator {
    fn default() -> Self {
        Self::new(livedu_core::DEFAULT_ESTIMATE_TIMEOUT)
    }
}

impl SizeEstimator for DuEstimator {
    fn estimate<'a>(&'a self, path: &'a Path, cancel: &'a CancellationToken) -> BoxFuture<'a, u64> {
        Box::pin(async move {
            match self.run(path, cancel).await {
                Ok(size) => size,
                Err(EstimateError::Cancelled) => 0,
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "size estimation failed");
                    0
                }
            }
        })
    }
}

/// Estimator that reports the same size for every directory.
///
/// Useful for hosts that don't want to spawn processes, and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedEstimator(pub u64);

impl SizeEstimator for FixedEstimator {
    fn estimate<'a>(&'a self, _path: &'a Path, cancel: &'a CancellationToken) -> BoxFuture<'a, u64> {
        let size = if cancel.is_cancelled() { 0 } else { self.0 };
        Box::pin(async move { size })
    }
}

/// Parse the first line of `du -sk` output into bytes.
fn parse_du_output(output: &str) -> Option<u64> {
    let kib: u64 = output.lines().next()?.split_whitespace().next()?.parse().ok()?;
    Some(kib.saturating_mul(1024))
}
