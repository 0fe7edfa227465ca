//! The [`PoolManager`] implementation for gm batch processes.

use super::engine::PoolManager;
use crate::command::Command;
use crate::connection::PooledConnection;
use crate::process::{GmSpawner, TransportFactory};
use crate::Result;

/// Manages [`PooledConnection`] lifecycles on behalf of the pool engine:
/// spawning batch processes, probing them with `ping`, enforcing the sticky
/// fault and use-limit checkpoints, and closing them down.
pub struct BatchManager<F: TransportFactory = GmSpawner> {
    factory: F,
    gm_path: String,
    evict_after_use: u64,
}

impl<F: TransportFactory> BatchManager<F> {
    pub fn new(factory: F, gm_path: impl Into<String>, evict_after_use: u64) -> Self {
        Self {
            factory,
            gm_path: gm_path.into(),
            evict_after_use,
        }
    }
}

impl<F> PoolManager for BatchManager<F>
where
    F: TransportFactory + 'static,
    F::Transport: 'static,
{
    type Conn = PooledConnection<F::Transport>;

    async fn create(&self) -> Result<Self::Conn> {
        let transport = self.factory.open(&self.gm_path).await?;
        tracing::debug!(path = %self.gm_path, "spawned batch process for pool");
        Ok(PooledConnection::new(transport, self.evict_after_use))
    }

    async fn validate(&self, conn: &mut Self::Conn) -> bool {
        conn.execute(&Command::new("ping")).await.is_ok()
    }

    fn activate(&self, conn: &mut Self::Conn) -> Result<()> {
        conn.ensure_healthy()
    }

    fn passivate(&self, conn: &mut Self::Conn) -> Result<()> {
        conn.ensure_healthy()
    }

    async fn destroy(&self, mut conn: Self::Conn) {
        conn.close().await;
    }
}
