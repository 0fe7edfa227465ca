//! Pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::engine::PoolOptions;
use crate::process::DEFAULT_GM_PATH;

/// Default bound on concurrently borrowed connections.
pub const DEFAULT_MAX_ACTIVE: usize = 8;
/// Default bound on idle connections kept for reuse.
pub const DEFAULT_MAX_IDLE: usize = 8;
/// Default number of idle connections inspected per sweep.
pub const DEFAULT_TESTS_PER_SWEEP: usize = 3;
/// Default borrow retry budget before the pool reports itself degraded.
pub const DEFAULT_BORROW_ATTEMPTS: u32 = 3;

/// What `borrow` does when every connection slot is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedPolicy {
    /// Fail immediately with [`Error::PoolExhausted`](crate::Error::PoolExhausted).
    Fail,
    /// Wait for a slot. `None` or a zero duration waits indefinitely; a
    /// positive duration fails with
    /// [`Error::PoolTimeout`](crate::Error::PoolTimeout) when it elapses.
    Block {
        #[serde(default)]
        timeout: Option<Duration>,
    },
    /// Create a new connection anyway, growing past `max_active`.
    Grow,
}

impl Default for ExhaustedPolicy {
    fn default() -> Self {
        Self::Block { timeout: None }
    }
}

/// Which idle connection `borrow` picks first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdleOrder {
    /// Most recently returned first. Keeps the working set small and warm.
    #[default]
    Lifo,
    /// Oldest first. Cycles every pooled process evenly.
    Fifo,
}

/// Configuration of a [`GmConnectionPool`](super::GmConnectionPool).
///
/// Plain fields with serde support so deployments can load pool settings
/// from a config file. Defaults favor indefinite blocking on exhaustion and
/// no active validation.
///
/// # Example
///
/// ```
/// use gmbatch::pool::PoolConfig;
///
/// let config = PoolConfig {
///     max_active: 4,
///     evict_after_use: 500,
///     ..PoolConfig::default()
/// };
/// assert_eq!(config.gm_path, "gm");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Path to the GraphicsMagick executable, resolved via the OS search
    /// path when not absolute.
    pub gm_path: String,

    /// Number of commands a process may serve before the pool retires it at
    /// the next checkpoint. Zero disables use-limit eviction.
    ///
    /// This is not a hard cap: a borrower holding one connection across many
    /// calls can exceed it before the pool next looks.
    pub evict_after_use: u64,

    /// Maximum concurrently borrowed connections.
    pub max_active: usize,

    /// Maximum idle connections retained; surplus returns are destroyed.
    pub max_idle: usize,

    /// Idle connections the sweeper keeps ready. Requires `sweep_interval`.
    pub min_idle: usize,

    /// Behavior when all `max_active` slots are borrowed.
    pub exhausted_policy: ExhaustedPolicy,

    /// Idle selection order on borrow.
    pub idle_order: IdleOrder,

    /// Validate (ping) each connection when it is borrowed.
    pub test_on_borrow: bool,

    /// Validate (ping) each connection when it is returned.
    pub test_on_return: bool,

    /// Validate idle connections from the sweeper.
    pub test_while_idle: bool,

    /// How often the idle sweeper runs. `None` disables the sweeper (and
    /// with it `test_while_idle`, `max_idle_age`, and `min_idle`).
    pub sweep_interval: Option<Duration>,

    /// Upper bound on idle connections examined per sweep.
    pub tests_per_sweep: usize,

    /// Idle connections older than this are evicted by the sweeper.
    pub max_idle_age: Option<Duration>,

    /// How many candidate connections `borrow` will try before giving up
    /// with [`Error::PoolDegraded`](crate::Error::PoolDegraded).
    pub borrow_attempts: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            gm_path: DEFAULT_GM_PATH.to_string(),
            evict_after_use: 0,
            max_active: DEFAULT_MAX_ACTIVE,
            max_idle: DEFAULT_MAX_IDLE,
            min_idle: 0,
            exhausted_policy: ExhaustedPolicy::default(),
            idle_order: IdleOrder::default(),
            test_on_borrow: false,
            test_on_return: false,
            test_while_idle: false,
            sweep_interval: None,
            tests_per_sweep: DEFAULT_TESTS_PER_SWEEP,
            max_idle_age: None,
            borrow_attempts: DEFAULT_BORROW_ATTEMPTS,
        }
    }
}

impl PoolConfig {
    /// The subset of settings the generic pool engine consumes.
    pub(crate) fn engine_options(&self) -> PoolOptions {
        PoolOptions {
            max_active: self.max_active,
            max_idle: self.max_idle,
            min_idle: self.min_idle,
            exhausted_policy: self.exhausted_policy,
            idle_order: self.idle_order,
            test_on_borrow: self.test_on_borrow,
            test_on_return: self.test_on_return,
            test_while_idle: self.test_while_idle,
            sweep_interval: self.sweep_interval,
            tests_per_sweep: self.tests_per_sweep,
            max_idle_age: self.max_idle_age,
            borrow_attempts: self.borrow_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_block_indefinitely_without_validation() {
        let config = PoolConfig::default();
        assert_eq!(config.gm_path, "gm");
        assert_eq!(
            config.exhausted_policy,
            ExhaustedPolicy::Block { timeout: None }
        );
        assert_eq!(config.idle_order, IdleOrder::Lifo);
        assert_eq!(config.evict_after_use, 0);
        assert!(!config.test_on_borrow);
        assert!(!config.test_on_return);
        assert!(!config.test_while_idle);
        assert!(config.sweep_interval.is_none());
    }

    #[test]
    fn serde_round_trip() {
        let config = PoolConfig {
            gm_path: "/usr/local/bin/gm".into(),
            max_active: 2,
            exhausted_policy: ExhaustedPolicy::Block {
                timeout: Some(Duration::from_secs(5)),
            },
            idle_order: IdleOrder::Fifo,
            sweep_interval: Some(Duration::from_secs(30)),
            ..PoolConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: PoolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let parsed: PoolConfig =
            serde_json::from_str(r#"{"gm_path": "/opt/gm", "max_active": 3}"#).unwrap();
        assert_eq!(parsed.gm_path, "/opt/gm");
        assert_eq!(parsed.max_active, 3);
        assert_eq!(parsed.max_idle, DEFAULT_MAX_IDLE);
        assert_eq!(parsed.borrow_attempts, DEFAULT_BORROW_ATTEMPTS);
    }
}
