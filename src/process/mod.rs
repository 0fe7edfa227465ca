//! Process management for gm batch mode.
//!
//! This module handles spawning and talking to the GraphicsMagick subprocess.
//! The child runs `gm batch` reading one command per line from stdin and
//! answering on stdout with free-text lines followed by a sentinel.
//!
//! # Architecture
//!
//! ```text
//! gmbatch                              gm batch
//! ┌──────────────┐                    ┌─────────────┐
//! │ GmProcess    │──stdin (commands)─▶│             │
//! │              │◀─stdout (lines +───│             │
//! │              │     OK/NG sentinel)│             │
//! └──────────────┘                    └─────────────┘
//! ```
//!
//! The [`BatchTransport`] trait abstracts the byte-level line exchange so the
//! protocol and pool layers can be tested against scripted transports, and
//! [`TransportFactory`] is the seam the pool uses to open new transports.

mod spawn;

pub mod probe;

pub use spawn::{GmProcess, GmSpawner};

use std::future::Future;
use std::io;

/// Default name of the GraphicsMagick executable, resolved via the OS search
/// path.
pub const DEFAULT_GM_PATH: &str = "gm";

/// Sentinel line gm emits after a successful command.
pub const PASS_SENTINEL: &str = "OK";

/// Sentinel line gm emits after a failed command.
pub const FAIL_SENTINEL: &str = "NG";

/// Platform line terminator, matching what gm batch expects and emits.
#[cfg(windows)]
pub const EOL: &str = "\r\n";
/// Platform line terminator, matching what gm batch expects and emits.
#[cfg(not(windows))]
pub const EOL: &str = "\n";

/// One line-oriented channel to a gm batch process.
///
/// This is the seam between the protocol engine and the OS process: the
/// production implementation is [`GmProcess`], tests substitute scripted
/// transports. One `send` of a full command line is answered by a sequence of
/// `recv` lines ending in a sentinel; the protocol is half-duplex per call.
///
/// The methods return explicitly `Send` futures so connections can live
/// inside spawned tasks (the pool's sweeper among them); implementations can
/// still be written as plain `async fn`.
pub trait BatchTransport: Send {
    /// Write one already-encoded command line (terminator included) and flush.
    fn send(&mut self, line: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Read the next output line, stripped of its terminator.
    ///
    /// Returns `Ok(None)` at end of stream. Blank lines are real output and
    /// are returned as empty strings, not skipped.
    fn recv(&mut self) -> impl Future<Output = io::Result<Option<String>>> + Send;

    /// Terminate the underlying process and release OS resources.
    ///
    /// Must be safe to call more than once.
    fn shutdown(&mut self) -> impl Future<Output = ()> + Send;
}

/// Opens new [`BatchTransport`]s for a gm executable path.
///
/// The pool calls this once per connection it creates. [`GmSpawner`] is the
/// production implementation: it resolves the batch argument vector through
/// the version probe (memoized per path) and spawns the process. Tests supply
/// factories handing out scripted transports without touching the probe.
pub trait TransportFactory: Send + Sync {
    /// The transport type this factory produces.
    type Transport: BatchTransport;

    /// Open a new transport to a batch process for `gm_path`.
    fn open(&self, gm_path: &str) -> impl Future<Output = crate::Result<Self::Transport>> + Send;
}
