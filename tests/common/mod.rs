//! Scripted transports standing in for real gm processes.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use gmbatch::{BatchTransport, Error, Result, TransportFactory};

#[derive(Default)]
struct TransportState {
    sent: Vec<String>,
    replies: VecDeque<String>,
    shutdowns: usize,
}

/// A transport that replays a scripted sequence of reply lines and records
/// everything sent to it.
pub struct MockTransport {
    state: Arc<Mutex<TransportState>>,
}

/// Shared view into a [`MockTransport`], usable after the transport has
/// been handed off to a connection.
#[derive(Clone)]
pub struct TransportHandle {
    state: Arc<Mutex<TransportState>>,
}

impl MockTransport {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(TransportState {
                replies: replies.into(),
                ..TransportState::default()
            })),
        }
    }

    pub fn handle(&self) -> TransportHandle {
        TransportHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl TransportHandle {
    /// Lines sent so far, decoded as UTF-8, trailing EOL stripped.
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.state.lock().unwrap().shutdowns
    }
}

impl BatchTransport for MockTransport {
    async fn send(&mut self, line: &[u8]) -> io::Result<()> {
        let text = std::str::from_utf8(line)
            .expect("commands are UTF-8")
            .trim_end_matches(['\r', '\n'])
            .to_string();
        self.state.lock().unwrap().sent.push(text);
        Ok(())
    }

    async fn recv(&mut self) -> io::Result<Option<String>> {
        Ok(self.state.lock().unwrap().replies.pop_front())
    }

    async fn shutdown(&mut self) {
        self.state.lock().unwrap().shutdowns += 1;
    }
}

/// Builds reply scripts the way gm batch mode emits them: output lines
/// followed by the pass or fail sentinel.
#[derive(Default)]
pub struct ScriptBuilder {
    replies: Vec<String>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A successful command: `lines` of output, then `OK`.
    pub fn ok<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replies.extend(lines.into_iter().map(Into::into));
        self.replies.push("OK".to_string());
        self
    }

    /// A failed command: `lines` of diagnostics, then `NG`.
    pub fn fail<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replies.extend(lines.into_iter().map(Into::into));
        self.replies.push("NG".to_string());
        self
    }

    pub fn build(self) -> MockTransport {
        MockTransport::new(self.replies)
    }
}

#[derive(Default)]
struct FactoryState {
    transports: VecDeque<MockTransport>,
    opened: Vec<String>,
}

/// Hands out pre-scripted transports in order; opening past the end fails
/// the way a missing gm binary would.
#[derive(Clone, Default)]
pub struct MockFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, transport: MockTransport) {
        self.state.lock().unwrap().transports.push_back(transport);
    }

    /// Queue a transport and keep a handle to it for later inspection.
    pub fn push_scripted(&self, script: ScriptBuilder) -> TransportHandle {
        let transport = script.build();
        let handle = transport.handle();
        self.push(transport);
        handle
    }

    /// The `gm_path` values passed to each open call.
    pub fn opened(&self) -> Vec<String> {
        self.state.lock().unwrap().opened.clone()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opened.len()
    }
}

impl TransportFactory for MockFactory {
    type Transport = MockTransport;

    async fn open(&self, gm_path: &str) -> Result<MockTransport> {
        let mut state = self.state.lock().unwrap();
        state.opened.push(gm_path.to_string());
        state.transports.pop_front().ok_or_else(|| {
            Error::ProcessSpawn(io::Error::new(
                io::ErrorKind::NotFound,
                "no scripted transport left",
            ))
        })
    }
}
