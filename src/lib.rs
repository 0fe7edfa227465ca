//! # gmbatch
//!
//! Async Rust interface to GraphicsMagick's `gm batch` mode.
//!
//! GraphicsMagick can run as a long-lived interactive process that accepts
//! one command per line and reports a pass/fail sentinel after each, which
//! amortizes process startup across many commands. This library manages
//! those processes, supporting:
//! - Safe command building with batch-mode quoting handled for you
//! - A bounded pool of batch processes with health checks and idle sweeping
//! - A one-process-per-command strategy for isolation-sensitive work
//! - Session connections pinned to a single process
//!
//! ## Quick Start
//!
//! ```ignore
//! use gmbatch::{Command, GmService, PooledGmService, PoolConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let service = PooledGmService::new(PoolConfig::default());
//!     let command = Command::new("convert")
//!         .arg("in.png")
//!         .arg("-resize")
//!         .arg("120x120!")
//!         .arg("out.png");
//!     service.execute(&command).await?;
//!     service.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Sessions
//!
//! Several commands against the same process, e.g. to reuse a registered
//! image:
//!
//! ```ignore
//! use gmbatch::{GmConnection, GmService};
//!
//! let mut conn = service.connection().await?;
//! conn.execute(&Command::new("register").arg("in.png").arg("mpr:src")).await?;
//! conn.execute(&Command::new("convert").arg("mpr:src").arg("thumb.png")).await?;
//! conn.close().await;
//! ```
//!
//! ## Configuration
//!
//! ```ignore
//! use std::time::Duration;
//! use gmbatch::{ExhaustedPolicy, PoolConfig, PooledGmService};
//!
//! let service = PooledGmService::new(PoolConfig {
//!     gm_path: "/opt/gm/bin/gm".into(),
//!     max_active: 4,
//!     evict_after_use: 1000,
//!     exhausted_policy: ExhaustedPolicy::Block {
//!         timeout: Some(Duration::from_secs(5)),
//!     },
//!     ..PoolConfig::default()
//! });
//! ```

mod command;
pub mod connection;
mod error;
pub mod pool;
pub mod process;
mod service;

pub use error::{Error, Result};

// Re-export the main service types at crate root
pub use command::Command;
pub use service::{GmConnection, GmService, PooledGmService, PooledHandle, SimpleGmService};

// Re-export commonly used pool types at crate root
pub use pool::{ExhaustedPolicy, GmConnectionPool, IdleOrder, PoolConfig};

// Re-export commonly used connection and process types at crate root
pub use connection::{BasicConnection, PooledConnection};
pub use process::{BatchTransport, GmSpawner, TransportFactory, DEFAULT_GM_PATH};
