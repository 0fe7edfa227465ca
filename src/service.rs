//! High-level entry points for running gm commands.
//!
//! Two strategies behind one [`GmService`] trait:
//!
//! - [`PooledGmService`] runs every command against a pool of long-lived
//!   batch processes. This is the fast path and the right default for
//!   servers doing image work continuously.
//! - [`SimpleGmService`] spawns a fresh batch process per call (or per
//!   checked-out connection). Slower, but every command sees a pristine
//!   process; useful for one-off jobs and for diagnosing state leakage.
//!
//! Both also hand out session connections via
//! [`connection`](GmService::connection) for callers that need several
//! commands against the same process, e.g. to reuse a registered image.

use crate::command::Command;
use crate::connection::{BasicConnection, PooledConnection};
use crate::pool::{GmConnectionPool, PoolConfig};
use crate::process::{GmSpawner, TransportFactory, DEFAULT_GM_PATH};
use crate::{Error, Result};

/// A strategy for executing gm commands.
#[allow(async_fn_in_trait)]
pub trait GmService {
    /// The session connection type handed out by
    /// [`connection`](Self::connection).
    type Connection: GmConnection;

    /// Run one command and return its output.
    async fn execute(&self, command: &Command) -> Result<String>;

    /// Run one pre-encoded line and return its output. The caller is
    /// responsible for quoting; [`execute`](Self::execute) is the safe
    /// variant.
    async fn execute_raw(&self, line: &str) -> Result<String>;

    /// Check out a connection pinned to a single process for a multi-step
    /// session. Call [`GmConnection::close`] when done.
    async fn connection(&self) -> Result<Self::Connection>;
}

/// A session connection pinned to one batch process.
#[allow(async_fn_in_trait)]
pub trait GmConnection {
    async fn execute(&mut self, command: &Command) -> Result<String>;

    async fn execute_raw(&mut self, line: &str) -> Result<String>;

    /// Release the connection. Idempotent; the connection is unusable
    /// afterwards.
    async fn close(&mut self);
}

/// Runs commands against a pool of long-lived batch processes.
///
/// [`execute`](GmService::execute) borrows a connection, runs the command,
/// and returns the connection to the pool, so concurrent callers spread
/// across the pool automatically.
pub struct PooledGmService<F: TransportFactory = GmSpawner>
where
    F: 'static,
    F::Transport: 'static,
{
    pool: GmConnectionPool<F>,
}

impl PooledGmService<GmSpawner> {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            pool: GmConnectionPool::new(config),
        }
    }
}

impl<F> PooledGmService<F>
where
    F: TransportFactory + 'static,
    F::Transport: 'static,
{
    pub fn with_factory(factory: F, config: PoolConfig) -> Self {
        Self {
            pool: GmConnectionPool::with_factory(factory, config),
        }
    }

    /// The pool backing this service, for inspection and shutdown.
    pub fn pool(&self) -> &GmConnectionPool<F> {
        &self.pool
    }

    /// Shut the service down: close the pool and its idle processes.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl<F> GmService for PooledGmService<F>
where
    F: TransportFactory + 'static,
    F::Transport: 'static,
{
    type Connection = PooledHandle<F>;

    async fn execute(&self, command: &Command) -> Result<String> {
        let mut conn = self.pool.borrow().await?;
        let result = conn.execute(command).await;
        self.pool.give_back(conn).await;
        result
    }

    async fn execute_raw(&self, line: &str) -> Result<String> {
        let mut conn = self.pool.borrow().await?;
        let result = conn.execute_raw(line).await;
        self.pool.give_back(conn).await;
        result
    }

    async fn connection(&self) -> Result<Self::Connection> {
        let conn = self.pool.borrow().await?;
        Ok(PooledHandle {
            pool: self.pool.clone(),
            conn: Some(conn),
        })
    }
}

/// A checked-out pool connection.
///
/// [`close`](GmConnection::close) returns the connection to the pool for
/// reuse. A handle dropped without closing quarantines its process instead
/// of recycling it, so forgetting to close costs a process, never
/// correctness.
pub struct PooledHandle<F: TransportFactory>
where
    F: 'static,
    F::Transport: 'static,
{
    pool: GmConnectionPool<F>,
    conn: Option<PooledConnection<F::Transport>>,
}

impl<F> PooledHandle<F>
where
    F: TransportFactory + 'static,
    F::Transport: 'static,
{
    fn live(&mut self) -> Result<&mut PooledConnection<F::Transport>> {
        self.conn.as_mut().ok_or(Error::ConnectionClosed)
    }

    /// Commands run through this handle so far.
    pub fn use_count(&self) -> u64 {
        self.conn.as_ref().map_or(0, PooledConnection::use_count)
    }
}

impl<F> GmConnection for PooledHandle<F>
where
    F: TransportFactory + 'static,
    F::Transport: 'static,
{
    async fn execute(&mut self, command: &Command) -> Result<String> {
        self.live()?.execute(command).await
    }

    async fn execute_raw(&mut self, line: &str) -> Result<String> {
        self.live()?.execute_raw(line).await
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(conn).await;
        }
    }
}

impl<F> Drop for PooledHandle<F>
where
    F: TransportFactory + 'static,
    F::Transport: 'static,
{
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::debug!("pooled connection dropped without close, quarantining process");
            self.pool.forfeit(conn);
        }
    }
}

/// Spawns a fresh batch process per command (or per session connection).
pub struct SimpleGmService<F: TransportFactory = GmSpawner> {
    factory: F,
    gm_path: String,
}

impl SimpleGmService<GmSpawner> {
    pub fn new() -> Self {
        Self::at_path(DEFAULT_GM_PATH)
    }

    /// Use the gm executable at `gm_path` instead of searching `PATH`.
    pub fn at_path(gm_path: impl Into<String>) -> Self {
        Self::with_factory(GmSpawner, gm_path)
    }
}

impl Default for SimpleGmService<GmSpawner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: TransportFactory> SimpleGmService<F> {
    pub fn with_factory(factory: F, gm_path: impl Into<String>) -> Self {
        Self {
            factory,
            gm_path: gm_path.into(),
        }
    }

    async fn open(&self) -> Result<BasicConnection<F::Transport>> {
        let transport = self.factory.open(&self.gm_path).await?;
        Ok(BasicConnection::new(transport))
    }
}

impl<F: TransportFactory> GmService for SimpleGmService<F> {
    type Connection = BasicConnection<F::Transport>;

    async fn execute(&self, command: &Command) -> Result<String> {
        let mut conn = self.open().await?;
        let result = conn.execute(command).await;
        conn.close().await;
        result
    }

    async fn execute_raw(&self, line: &str) -> Result<String> {
        let mut conn = self.open().await?;
        let result = conn.execute_raw(line).await;
        conn.close().await;
        result
    }

    async fn connection(&self) -> Result<Self::Connection> {
        self.open().await
    }
}

impl<T: crate::process::BatchTransport> GmConnection for BasicConnection<T> {
    async fn execute(&mut self, command: &Command) -> Result<String> {
        BasicConnection::execute(self, command).await
    }

    async fn execute_raw(&mut self, line: &str) -> Result<String> {
        BasicConnection::execute_raw(self, line).await
    }

    async fn close(&mut self) {
        BasicConnection::close(self).await;
    }
}
