//! Connection pooling for gm batch processes.
//!
//! [`GmConnectionPool`] keeps a bounded set of long-lived `gm batch`
//! processes and hands them out for exclusive use, so callers pay the
//! process startup cost once rather than per command. The engine underneath
//! ([`engine::Pool`]) is generic; [`BatchManager`] supplies the gm-specific
//! lifecycle, and [`PoolConfig`] the knobs.

mod config;
mod engine;
mod manager;

pub use config::{ExhaustedPolicy, IdleOrder, PoolConfig};
pub use engine::{Pool, PoolManager, PoolOptions};
pub use manager::BatchManager;

use crate::connection::PooledConnection;
use crate::process::{GmSpawner, TransportFactory};
use crate::Result;

/// A pool of gm batch processes.
///
/// Cloning is cheap and shares the pool. Connections are borrowed for
/// exclusive use and must be given back; a borrowed connection observed to
/// be broken mid-use is quarantined automatically and replaced on the next
/// borrow.
pub struct GmConnectionPool<F: TransportFactory = GmSpawner>
where
    F: 'static,
    F::Transport: 'static,
{
    inner: Pool<BatchManager<F>>,
}

impl<F> Clone for GmConnectionPool<F>
where
    F: TransportFactory + 'static,
    F::Transport: 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl GmConnectionPool<GmSpawner> {
    /// Create a pool spawning real `gm` processes per `config`.
    ///
    /// Must be called within a tokio runtime when `config.sweep_interval`
    /// is set.
    pub fn new(config: PoolConfig) -> Self {
        Self::with_factory(GmSpawner, config)
    }
}

impl<F> GmConnectionPool<F>
where
    F: TransportFactory + 'static,
    F::Transport: 'static,
{
    /// Create a pool over a custom transport factory, the seam tests use to
    /// substitute scripted transports for real processes.
    pub fn with_factory(factory: F, config: PoolConfig) -> Self {
        let manager = BatchManager::new(factory, config.gm_path.clone(), config.evict_after_use);
        let options = config.engine_options();
        Self {
            inner: Pool::new(manager, options),
        }
    }

    /// Borrow a connection for exclusive use. See [`Pool::borrow`] for the
    /// error contract.
    pub async fn borrow(&self) -> Result<PooledConnection<F::Transport>> {
        self.inner.borrow().await
    }

    /// Return a borrowed connection. Broken or surplus connections are
    /// destroyed instead of recycled; the caller never sees housekeeping
    /// failures.
    pub async fn give_back(&self, conn: PooledConnection<F::Transport>) {
        self.inner.give_back(conn).await;
    }

    /// Repair bookkeeping for a connection that is dropped rather than
    /// returned.
    pub(crate) fn forfeit(&self, conn: PooledConnection<F::Transport>) {
        self.inner.forfeit(conn);
    }

    /// Close the pool: shut down idle processes and reject further borrows.
    pub async fn close(&self) {
        self.inner.close().await;
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle_count()
    }

    pub fn active_count(&self) -> usize {
        self.inner.active_count()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
