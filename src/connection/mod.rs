//! Connections speaking the gm batch line protocol.
//!
//! [`BasicConnection`] owns one transport and implements command encoding,
//! sentinel decoding, and error classification. [`PooledConnection`] layers
//! the pool's health bookkeeping on top: a use counter and a sticky fault
//! flag, both inspected only at the pool's borrow/return checkpoints.

mod basic;
mod pooled;

pub use basic::BasicConnection;
pub use pooled::PooledConnection;
