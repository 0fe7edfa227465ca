//! Pool health bookkeeping layered over the protocol engine.

use crate::command::Command;
use crate::process::BatchTransport;
use crate::{Error, Result};

use super::BasicConnection;

/// A [`BasicConnection`] decorated with the pool's health state.
///
/// Every execute attempt bumps the use counter. Failures that indicate a
/// broken connection (anything other than a gm-reported failure, which is a
/// complete round trip) are captured into a sticky fault and rethrown
/// unchanged; the pool reads the fault at its next borrow/return checkpoint
/// and retires the connection instead of recycling it.
///
/// While idle the connection is owned exclusively by the pool; while active,
/// by exactly one borrower. Nothing here is locked.
pub struct PooledConnection<T: BatchTransport> {
    inner: BasicConnection<T>,
    use_count: u64,
    use_limit: u64,
    fault: Option<String>,
}

impl<T: BatchTransport> PooledConnection<T> {
    /// Wrap a fresh transport. `use_limit` of zero disables use-limit
    /// eviction.
    pub(crate) fn new(transport: T, use_limit: u64) -> Self {
        Self {
            inner: BasicConnection::new(transport),
            use_count: 0,
            use_limit,
            fault: None,
        }
    }

    /// Execute a tokenized command. See [`BasicConnection::execute`].
    pub async fn execute(&mut self, command: &Command) -> Result<String> {
        self.use_count += 1;
        let result = self.inner.execute(command).await;
        self.record_fault(&result);
        result
    }

    /// Execute one raw line. See [`BasicConnection::execute_raw`].
    pub async fn execute_raw(&mut self, line: &str) -> Result<String> {
        self.use_count += 1;
        let result = self.inner.execute_raw(line).await;
        self.record_fault(&result);
        result
    }

    /// How many execute attempts this connection has served.
    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    /// Health check run by the pool at the borrow and return checkpoints.
    ///
    /// Fails when a fault was recorded, or when a positive use limit is
    /// configured and exceeded. The limit is only ever inspected here, so a
    /// borrower holding the connection across many calls can overshoot it
    /// before the pool notices; that imprecision is accepted.
    pub(crate) fn ensure_healthy(&self) -> Result<()> {
        if let Some(fault) = &self.fault {
            return Err(Error::Unhealthy {
                reason: fault.clone(),
            });
        }
        if self.use_limit > 0 && self.use_count > self.use_limit {
            return Err(Error::Unhealthy {
                reason: format!(
                    "instance is stale, executed {} commands which exceeded the {} limit",
                    self.use_count, self.use_limit
                ),
            });
        }
        Ok(())
    }

    /// Close the underlying connection. Idempotent.
    pub(crate) async fn close(&mut self) {
        self.inner.close().await;
    }

    fn record_fault(&mut self, result: &Result<String>) {
        if let Err(e) = result {
            // Tool-reported failures are healthy round trips; everything
            // else means this process can no longer be trusted.
            if !e.is_gm_failure() {
                tracing::debug!(error = %e, "recording connection fault");
                self.fault = Some(e.to_string());
            }
        }
    }
}
