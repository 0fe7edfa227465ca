use std::time::Duration;

/// Errors that can occur when using gmbatch.
///
/// Errors are organized by category:
/// - Validation errors: caller bugs detected before any I/O
/// - Spawn errors: failed to start the gm process
/// - Protocol errors: communication failures with the subprocess
/// - Tool-reported failures: well-formed round trips where gm said "NG"
/// - Pool errors: capacity and lifecycle failures
/// - Probe errors: the external gm binary could not be identified
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    // -------------------------------------------------------------------------
    // Validation errors (detected before any I/O)
    // -------------------------------------------------------------------------
    /// The command was empty or otherwise malformed. Never retried.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The connection was already closed when `execute` was called.
    #[error("connection is already closed")]
    ConnectionClosed,

    // -------------------------------------------------------------------------
    // Spawn errors
    // -------------------------------------------------------------------------
    /// The gm binary was not found on the OS search path.
    #[error("gm executable not found (searched: {searched})")]
    GmNotFound { searched: String },

    /// Failed to spawn the gm subprocess.
    #[error("failed to spawn gm process: {0}")]
    ProcessSpawn(#[source] std::io::Error),

    // -------------------------------------------------------------------------
    // Protocol errors (connection is broken, not retried transparently)
    // -------------------------------------------------------------------------
    /// IO error communicating with the gm subprocess.
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),

    /// The subprocess closed its output before emitting a sentinel line.
    ///
    /// This signals the child died or closed stdout unexpectedly. Whatever
    /// partial output had accumulated is carried along for diagnostics.
    #[error("gm output closed unexpectedly after receiving: {partial}")]
    StreamClosed { partial: String },

    // -------------------------------------------------------------------------
    // Tool-reported failures (well-formed round trips, kind preserved)
    // -------------------------------------------------------------------------
    /// gm reported a failure caused by an underlying file or I/O problem.
    #[error("gm reported an I/O failure: {output}")]
    GmIoFailure { output: String },

    /// gm reported that the command itself failed.
    #[error("gm command failed: {output}")]
    GmCommandFailure { output: String },

    // -------------------------------------------------------------------------
    // Pool errors
    // -------------------------------------------------------------------------
    /// No idle connection available and the pool is configured to fail fast.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// Waited for an idle connection longer than the configured timeout.
    #[error("timed out after {0:?} waiting for a pooled connection")]
    PoolTimeout(Duration),

    /// The pool has been closed.
    #[error("connection pool is closed")]
    PoolClosed,

    /// Every borrow attempt produced an unhealthy connection.
    ///
    /// Surfaced instead of retrying forever when the external tool appears
    /// systemically broken.
    #[error("gave up borrowing after {attempts} failed attempts, pool is degraded")]
    PoolDegraded { attempts: u32 },

    /// A pooled connection failed its health check at a checkpoint.
    #[error("connection is unhealthy: {reason}")]
    Unhealthy { reason: String },

    // -------------------------------------------------------------------------
    // Probe errors (fatal, not retriable)
    // -------------------------------------------------------------------------
    /// Could not run or understand `gm version` for the configured path.
    #[error("could not detect GraphicsMagick version, is '{path}' in PATH? ({reason})")]
    VersionProbe { path: String, reason: String },
}

/// A specialized Result type for gmbatch operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an IO error.
    pub fn io(source: std::io::Error) -> Self {
        Self::Io(source)
    }

    /// Check if this is a failure gm itself reported over a healthy connection.
    ///
    /// These are complete round trips: the command was sent, gm answered with
    /// the failure sentinel. The connection remains usable and the pool will
    /// not record a fault for them.
    pub fn is_gm_failure(&self) -> bool {
        matches!(
            self,
            Error::GmIoFailure { .. } | Error::GmCommandFailure { .. }
        )
    }

    /// Check if this error is plausibly transient.
    ///
    /// Pool capacity errors and broken-connection errors can succeed on a
    /// retry against a fresh connection; validation, spawn, and probe errors
    /// cannot.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::StreamClosed { .. }
                | Error::PoolExhausted
                | Error::PoolTimeout(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }

    #[test]
    fn gm_failure_detection() {
        assert!(Error::GmIoFailure {
            output: "unable to open image [in.png].".into()
        }
        .is_gm_failure());
        assert!(Error::GmCommandFailure {
            output: "bad option".into()
        }
        .is_gm_failure());
        assert!(!Error::ConnectionClosed.is_gm_failure());
        assert!(!Error::StreamClosed { partial: "".into() }.is_gm_failure());
    }

    #[test]
    fn retryable_detection() {
        assert!(Error::PoolTimeout(Duration::from_secs(5)).is_retryable());
        assert!(Error::PoolExhausted.is_retryable());
        assert!(Error::StreamClosed { partial: "".into() }.is_retryable());
        assert!(!Error::InvalidCommand("empty".into()).is_retryable());
        assert!(!Error::VersionProbe {
            path: "gm".into(),
            reason: "no output".into()
        }
        .is_retryable());
    }

    #[test]
    fn question_mark_operator_io() {
        fn fallible_io() -> Result<()> {
            let _file = std::fs::File::open("/nonexistent/path/that/does/not/exist")?;
            Ok(())
        }
        let result = fallible_io();
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn display_includes_context() {
        let err = Error::GmNotFound {
            searched: "gm".into(),
        };
        assert!(err.to_string().contains("gm"));

        let err = Error::PoolDegraded { attempts: 3 };
        assert!(err.to_string().contains('3'));
    }
}
