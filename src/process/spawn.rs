//! Spawning and lifecycle of the gm batch subprocess.

use std::io;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::{BatchTransport, TransportFactory};
use crate::{Error, Result};

/// A running gm batch process.
///
/// Stdin and stdout are piped; stderr goes to the null device since batch
/// mode reports failures through the feedback sentinel on stdout.
///
/// # Cleanup
///
/// Dropping a `GmProcess` kills the subprocess (`kill_on_drop`), so a
/// connection can never leak a child past its owning scope. [`shutdown`]
/// additionally reaps the exit status and is what the pool calls on destroy.
///
/// [`shutdown`]: BatchTransport::shutdown
pub struct GmProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    line: String,
}

impl GmProcess {
    /// Spawn a new process from an argument vector (`argv[0]` is the program).
    pub async fn spawn(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::InvalidCommand("empty argument vector".into()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    Error::GmNotFound {
                        searched: program.clone(),
                    }
                } else {
                    Error::ProcessSpawn(e)
                }
            })?;

        let stdin = child.stdin.take().expect("stdin was configured");
        let stdout = child.stdout.take().expect("stdout was configured");
        tracing::debug!(pid = ?child.id(), program = %program, "spawned gm process");

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            line: String::with_capacity(256),
        })
    }

    /// Get the process ID, if the process is still running.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check if the process has not yet been reaped.
    pub fn is_running(&self) -> bool {
        self.child.id().is_some()
    }
}

impl BatchTransport for GmProcess {
    async fn send(&mut self, line: &[u8]) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdin already closed"))?;
        stdin.write_all(line).await?;
        stdin.flush().await
    }

    async fn recv(&mut self) -> io::Result<Option<String>> {
        self.line.clear();
        let bytes_read = self.stdout.read_line(&mut self.line).await?;
        if bytes_read == 0 {
            return Ok(None);
        }
        // Strip the terminator only; interior whitespace is output.
        if self.line.ends_with('\n') {
            self.line.pop();
            if self.line.ends_with('\r') {
                self.line.pop();
            }
        }
        Ok(Some(self.line.clone()))
    }

    async fn shutdown(&mut self) {
        // Closing stdin lets batch mode exit on its own; the kill below
        // covers a wedged child.
        self.stdin.take();
        if let Err(e) = self.child.kill().await {
            tracing::debug!("failed to kill gm process: {}", e);
        }
    }
}

/// [`TransportFactory`] that spawns real gm processes.
///
/// Resolves the batch argument vector for the path through the version probe
/// (once per distinct path, memoized), then spawns.
#[derive(Debug, Clone, Copy, Default)]
pub struct GmSpawner;

impl TransportFactory for GmSpawner {
    type Transport = GmProcess;

    async fn open(&self, gm_path: &str) -> Result<GmProcess> {
        let argv = super::probe::batch_args(gm_path).await?;
        GmProcess::spawn(&argv).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawner_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GmSpawner>();
        assert_send_sync::<GmProcess>();
    }

    #[tokio::test]
    async fn spawn_missing_binary_is_not_found() {
        let argv = vec!["definitely-not-a-real-binary-4731".to_string()];
        let result = GmProcess::spawn(&argv).await;
        assert!(matches!(result, Err(Error::GmNotFound { .. })));
    }

    #[tokio::test]
    async fn spawn_empty_argv_is_invalid() {
        let result = GmProcess::spawn(&[]).await;
        assert!(matches!(result, Err(Error::InvalidCommand(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn round_trip_against_cat() {
        // `cat` echoes lines back, which is enough to exercise send/recv.
        let argv = vec!["cat".to_string()];
        let mut process = GmProcess::spawn(&argv).await.unwrap();
        assert!(process.is_running());

        process.send(b"hello world\n").await.unwrap();
        let line = process.recv().await.unwrap();
        assert_eq!(line.as_deref(), Some("hello world"));

        process.shutdown().await;
        // A second shutdown must be harmless.
        process.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn recv_preserves_blank_lines() {
        let argv = vec!["cat".to_string()];
        let mut process = GmProcess::spawn(&argv).await.unwrap();

        process.send(b"\n").await.unwrap();
        let line = process.recv().await.unwrap();
        assert_eq!(line.as_deref(), Some(""));

        process.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn recv_returns_none_at_eof() {
        let argv = vec!["true".to_string()];
        let mut process = GmProcess::spawn(&argv).await.unwrap();
        // `true` exits immediately without output.
        let line = process.recv().await.unwrap();
        assert_eq!(line, None);
    }
}
