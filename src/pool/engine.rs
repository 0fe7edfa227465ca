//! A generic bounded async object pool.
//!
//! The engine knows nothing about gm: it is parameterized over a
//! [`PoolManager`] supplying the `{create, validate, activate, passivate,
//! destroy}` lifecycle hooks as a value. Capacity is modeled with a
//! semaphore (a permit is one borrowed slot), idle bookkeeping with a plain
//! mutex; the pool is the only synchronization point, connections themselves
//! are handed out under exclusive ownership.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Semaphore, TryAcquireError};
use tokio::time::{interval, timeout as tokio_timeout, Instant, MissedTickBehavior};

use super::config::{ExhaustedPolicy, IdleOrder};
use crate::{Error, Result};

/// Lifecycle hooks for one kind of pooled object.
///
/// `create` and `destroy` bracket the object's life; `validate` is the
/// optional expensive health probe (a real round trip); `activate` and
/// `passivate` are the cheap checkpoints run on every borrow and return.
pub trait PoolManager: Send + Sync + 'static {
    /// The pooled object type.
    type Conn: Send + 'static;

    /// Create a fresh object. Errors surface unchanged to the borrower.
    fn create(&self) -> impl Future<Output = Result<Self::Conn>> + Send;

    /// Probe the object for liveness. `false` means destroy it.
    fn validate(&self, conn: &mut Self::Conn) -> impl Future<Output = bool> + Send;

    /// Checkpoint run when an object is borrowed. An error destroys it.
    fn activate(&self, conn: &mut Self::Conn) -> Result<()>;

    /// Checkpoint run when an object is returned. An error destroys it.
    fn passivate(&self, conn: &mut Self::Conn) -> Result<()>;

    /// Release the object's resources.
    fn destroy(&self, conn: Self::Conn) -> impl Future<Output = ()> + Send;
}

/// Engine-level settings; see
/// [`PoolConfig`](super::PoolConfig) for field semantics.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_active: usize,
    pub max_idle: usize,
    pub min_idle: usize,
    pub exhausted_policy: ExhaustedPolicy,
    pub idle_order: IdleOrder,
    pub test_on_borrow: bool,
    pub test_on_return: bool,
    pub test_while_idle: bool,
    pub sweep_interval: Option<Duration>,
    pub tests_per_sweep: usize,
    pub max_idle_age: Option<Duration>,
    pub borrow_attempts: u32,
}

impl Default for PoolOptions {
    fn default() -> Self {
        super::PoolConfig::default().engine_options()
    }
}

struct IdleEntry<C> {
    conn: C,
    idle_since: Instant,
}

struct State<C> {
    idle: VecDeque<IdleEntry<C>>,
    active: usize,
    closed: bool,
}

struct PoolShared<M: PoolManager> {
    manager: M,
    options: PoolOptions,
    state: Mutex<State<M::Conn>>,
    permits: Semaphore,
}

/// A bounded, concurrency-safe pool of objects managed by `M`.
///
/// Cloning is cheap and shares the underlying pool. Every live object is in
/// exactly one of the Idle, Active, or Destroyed sets: idle objects sit in
/// the pool, active objects are exclusively owned by their borrower, and a
/// destroyed object is gone.
pub struct Pool<M: PoolManager> {
    shared: Arc<PoolShared<M>>,
}

impl<M: PoolManager> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: PoolManager> Pool<M> {
    /// Create a pool over `manager`.
    ///
    /// When `sweep_interval` is set this spawns the idle sweeper task and
    /// must therefore be called within a tokio runtime.
    pub fn new(manager: M, options: PoolOptions) -> Self {
        let permit_count = match options.exhausted_policy {
            ExhaustedPolicy::Grow => Semaphore::MAX_PERMITS,
            _ => options.max_active.max(1),
        };
        let pool = Self {
            shared: Arc::new(PoolShared {
                manager,
                options,
                state: Mutex::new(State {
                    idle: VecDeque::new(),
                    active: 0,
                    closed: false,
                }),
                permits: Semaphore::new(permit_count),
            }),
        };
        pool.spawn_sweeper();
        pool
    }

    /// Borrow an object for exclusive use.
    ///
    /// Reuses an idle object when one is available, otherwise creates one.
    /// Each candidate passes the activate checkpoint (plus validation when
    /// `test_on_borrow` is set); failing candidates are destroyed and
    /// replaced transparently until the `borrow_attempts` budget runs out.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolExhausted`] / [`Error::PoolTimeout`] per the
    ///   configured exhaustion policy
    /// - [`Error::PoolClosed`] once [`close`](Self::close) has been called
    /// - [`Error::PoolDegraded`] when every candidate failed its checkpoint
    /// - whatever `create` failed with, unchanged
    pub async fn borrow(&self) -> Result<M::Conn> {
        let shared = &self.shared;
        if shared.state.lock().expect("pool lock poisoned").closed {
            return Err(Error::PoolClosed);
        }

        let permit = match shared.options.exhausted_policy {
            ExhaustedPolicy::Fail => match shared.permits.try_acquire() {
                Ok(permit) => permit,
                Err(TryAcquireError::NoPermits) => return Err(Error::PoolExhausted),
                Err(TryAcquireError::Closed) => return Err(Error::PoolClosed),
            },
            ExhaustedPolicy::Block {
                timeout: Some(limit),
            } if !limit.is_zero() => match tokio_timeout(limit, shared.permits.acquire()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_closed)) => return Err(Error::PoolClosed),
                Err(_elapsed) => return Err(Error::PoolTimeout(limit)),
            },
            // Block without (or with a zero) timeout waits indefinitely;
            // Grow always has permits to spare.
            _ => match shared.permits.acquire().await {
                Ok(permit) => permit,
                Err(_closed) => return Err(Error::PoolClosed),
            },
        };

        let mut attempts: u32 = 0;
        loop {
            let reused = {
                let mut state = shared.state.lock().expect("pool lock poisoned");
                if state.closed {
                    return Err(Error::PoolClosed);
                }
                match shared.options.idle_order {
                    IdleOrder::Lifo => state.idle.pop_back(),
                    IdleOrder::Fifo => state.idle.pop_front(),
                }
                .map(|entry| entry.conn)
            };

            let mut conn = match reused {
                Some(conn) => conn,
                // Dropping `permit` on the error path releases the slot.
                None => shared.manager.create().await?,
            };
            attempts += 1;

            if self.borrow_checkpoint(&mut conn).await {
                permit.forget();
                shared.state.lock().expect("pool lock poisoned").active += 1;
                return Ok(conn);
            }

            shared.manager.destroy(conn).await;
            if attempts >= shared.options.borrow_attempts.max(1) {
                tracing::warn!(attempts, "no borrow candidate passed its health check");
                return Err(Error::PoolDegraded { attempts });
            }
        }
    }

    async fn borrow_checkpoint(&self, conn: &mut M::Conn) -> bool {
        if let Err(e) = self.shared.manager.activate(conn) {
            tracing::debug!(error = %e, "activation failed, destroying connection");
            return false;
        }
        if self.shared.options.test_on_borrow && !self.shared.manager.validate(conn).await {
            tracing::debug!("validation on borrow failed, destroying connection");
            return false;
        }
        true
    }

    /// Return a borrowed object.
    ///
    /// The object passes the passivate checkpoint (plus validation when
    /// `test_on_return` is set); healthy objects rejoin the idle set, within
    /// `max_idle`, and everything else is destroyed. Housekeeping never
    /// fails the caller.
    pub async fn give_back(&self, mut conn: M::Conn) {
        let shared = &self.shared;
        let healthy = match shared.manager.passivate(&mut conn) {
            Ok(()) => !shared.options.test_on_return || shared.manager.validate(&mut conn).await,
            Err(e) => {
                tracing::debug!(error = %e, "passivation failed, dropping connection");
                false
            }
        };

        let surplus = {
            let mut state = shared.state.lock().expect("pool lock poisoned");
            state.active = state.active.saturating_sub(1);
            if healthy && !state.closed && state.idle.len() < shared.options.max_idle {
                state.idle.push_back(IdleEntry {
                    conn,
                    idle_since: Instant::now(),
                });
                None
            } else {
                Some(conn)
            }
        };
        if let Some(conn) = surplus {
            shared.manager.destroy(conn).await;
        }
        shared.permits.add_permits(1);
    }

    /// Repair the bookkeeping for a borrowed object that will never be
    /// returned, destroying it synchronously by drop.
    pub(crate) fn forfeit(&self, conn: M::Conn) {
        {
            let mut state = self.shared.state.lock().expect("pool lock poisoned");
            state.active = state.active.saturating_sub(1);
        }
        drop(conn);
        self.shared.permits.add_permits(1);
    }

    /// Close the pool: destroy idle objects and wake blocked borrowers with
    /// [`Error::PoolClosed`]. Objects currently borrowed are destroyed as
    /// they come back.
    pub async fn close(&self) {
        let drained: Vec<M::Conn> = {
            let mut state = self.shared.state.lock().expect("pool lock poisoned");
            if state.closed {
                Vec::new()
            } else {
                state.closed = true;
                state.idle.drain(..).map(|entry| entry.conn).collect()
            }
        };
        for conn in drained {
            self.shared.manager.destroy(conn).await;
        }
        self.shared.permits.close();
    }

    /// Number of idle objects currently held.
    pub fn idle_count(&self) -> usize {
        self.shared.state.lock().expect("pool lock poisoned").idle.len()
    }

    /// Number of objects currently borrowed.
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().expect("pool lock poisoned").active
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().expect("pool lock poisoned").closed
    }

    fn spawn_sweeper(&self) {
        let Some(period) = self.shared.options.sweep_interval else {
            return;
        };
        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else { break };
                if shared.state.lock().expect("pool lock poisoned").closed {
                    break;
                }
                sweep(&shared).await;
            }
        });
    }
}

/// One sweeper pass: age out and validate a batch of idle objects, then top
/// the idle set back up to `min_idle`.
async fn sweep<M: PoolManager>(shared: &PoolShared<M>) {
    let batch: Vec<IdleEntry<M::Conn>> = {
        let mut state = shared.state.lock().expect("pool lock poisoned");
        let count = shared.options.tests_per_sweep.min(state.idle.len());
        // Oldest entries sit at the front.
        state.idle.drain(..count).collect()
    };

    let now = Instant::now();
    let mut keep = Vec::new();
    for mut entry in batch {
        let expired = shared
            .options
            .max_idle_age
            .is_some_and(|age| now.duration_since(entry.idle_since) >= age);
        if expired {
            tracing::debug!("evicting idle connection past max idle age");
            shared.manager.destroy(entry.conn).await;
            continue;
        }
        if shared.options.test_while_idle && !shared.manager.validate(&mut entry.conn).await {
            tracing::debug!("idle validation failed, destroying connection");
            shared.manager.destroy(entry.conn).await;
            continue;
        }
        keep.push(entry);
    }

    let orphans: Vec<M::Conn> = {
        let mut state = shared.state.lock().expect("pool lock poisoned");
        if state.closed {
            keep.into_iter().map(|entry| entry.conn).collect()
        } else {
            // Put survivors back where they were: at the old end.
            for entry in keep.into_iter().rev() {
                state.idle.push_front(entry);
            }
            Vec::new()
        }
    };
    for conn in orphans {
        shared.manager.destroy(conn).await;
    }

    // Top up to min_idle, bounded by max_idle.
    loop {
        let wants_more = {
            let state = shared.state.lock().expect("pool lock poisoned");
            !state.closed
                && state.idle.len() < shared.options.min_idle
                && state.idle.len() < shared.options.max_idle
        };
        if !wants_more {
            break;
        }
        match shared.manager.create().await {
            Ok(conn) => {
                // The pool may have closed while we were creating; never
                // destroy while holding the state lock.
                let rejected = {
                    let mut state = shared.state.lock().expect("pool lock poisoned");
                    if state.closed {
                        Some(conn)
                    } else {
                        state.idle.push_back(IdleEntry {
                            conn,
                            idle_since: Instant::now(),
                        });
                        None
                    }
                };
                if let Some(conn) = rejected {
                    shared.manager.destroy(conn).await;
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to create connection for min idle");
                break;
            }
        }
    }
}
