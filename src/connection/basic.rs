//! The batch protocol engine: encode a command line, decode until a sentinel.

use crate::command::Command;
use crate::process::{BatchTransport, EOL, FAIL_SENTINEL, PASS_SENTINEL};
use crate::{Error, Result};

/// gm marks file and I/O problems by ending its failure text with this.
const IO_FAILURE_MARKER: &str = "].";

/// Keep the reusable output buffer no larger than this across calls. One
/// pathological response must not pin its capacity forever.
const NORMAL_BUFFER_SIZE: usize = 4096;

/// A connection to one gm batch process.
///
/// Owns exactly one transport and a reusable output buffer. A connection is
/// either open or closed; `execute` on a closed connection fails with
/// [`Error::ConnectionClosed`] before any I/O.
///
/// # Ownership
///
/// A connection has a single owner at a time (`&mut self` everywhere); the
/// protocol is half-duplex per call, so a second command must never be
/// written before the first command's sentinel has been read.
pub struct BasicConnection<T: BatchTransport> {
    transport: Option<T>,
    buffer: String,
}

impl<T: BatchTransport> BasicConnection<T> {
    /// Wrap a transport in a fresh open connection.
    pub fn new(transport: T) -> Self {
        Self {
            transport: Some(transport),
            buffer: String::new(),
        }
    }

    /// Execute a tokenized command and return gm's accumulated output.
    ///
    /// The verb is written verbatim; every further token is double-quoted
    /// with embedded quotes doubled, which is gm's own `windows` escape
    /// convention.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection was closed
    /// - [`Error::Io`] on a transport failure
    /// - [`Error::StreamClosed`] if gm's output ended before any sentinel
    /// - [`Error::GmIoFailure`] / [`Error::GmCommandFailure`] when gm
    ///   reported the failure sentinel
    pub async fn execute(&mut self, command: &Command) -> Result<String> {
        let line = encode(command);
        self.round_trip(line).await
    }

    /// Execute one raw line exactly as given (plus the line terminator).
    ///
    /// No quoting is applied; the caller is trusted to have escaped the line
    /// for gm already.
    pub async fn execute_raw(&mut self, line: &str) -> Result<String> {
        let mut wire = String::with_capacity(line.len() + EOL.len());
        wire.push_str(line);
        wire.push_str(EOL);
        self.round_trip(wire).await
    }

    /// Close the connection, terminating the underlying process.
    ///
    /// Idempotent: closing an already-closed connection does nothing.
    pub async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.shutdown().await;
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    async fn round_trip(&mut self, line: String) -> Result<String> {
        let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        transport.send(line.as_bytes()).await.map_err(Error::io)?;
        read_result(transport, &mut self.buffer).await
    }
}

/// Encode a command onto one wire line.
///
/// First token verbatim and unquoted, each remaining token as
/// ` "token-with-""-doubled"`, then the platform terminator.
fn encode(command: &Command) -> String {
    let tokens = command.tokens();
    let mut line = String::with_capacity(tokens.iter().map(|t| t.len() + 3).sum::<usize>() + 2);
    line.push_str(&tokens[0]);
    for token in &tokens[1..] {
        line.push(' ');
        line.push('"');
        for ch in token.chars() {
            if ch == '"' {
                line.push('"');
            }
            line.push(ch);
        }
        line.push('"');
    }
    line.push_str(EOL);
    line
}

/// Read lines until a sentinel, accumulating output into `buffer`.
async fn read_result<T: BatchTransport>(transport: &mut T, buffer: &mut String) -> Result<String> {
    buffer.clear();
    loop {
        match transport.recv().await.map_err(Error::io)? {
            Some(line) if line == PASS_SENTINEL => return Ok(take_output(buffer)),
            Some(line) if line == FAIL_SENTINEL => {
                let output = take_output(buffer);
                return if output.ends_with(IO_FAILURE_MARKER) {
                    Err(Error::GmIoFailure { output })
                } else {
                    Err(Error::GmCommandFailure { output })
                };
            }
            Some(line) => {
                buffer.push_str(&line);
                buffer.push_str(EOL);
            }
            None => {
                return Err(Error::StreamClosed {
                    partial: take_output(buffer),
                })
            }
        }
    }
}

/// Trim the trailing terminator and hand out the accumulated output.
///
/// The buffer is reset entirely when a response pushed it past
/// [`NORMAL_BUFFER_SIZE`], releasing the oversized allocation.
fn take_output(buffer: &mut String) -> String {
    if buffer.ends_with(EOL) {
        let trimmed = buffer.len() - EOL.len();
        buffer.truncate(trimmed);
    }
    let output = buffer.clone();
    if buffer.len() > NORMAL_BUFFER_SIZE {
        *buffer = String::new();
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    /// Scripted transport: records sent lines, replays queued output lines.
    struct Script {
        sent: Vec<String>,
        lines: VecDeque<io::Result<Option<String>>>,
        shutdowns: usize,
    }

    impl Script {
        fn new<I: IntoIterator<Item = &'static str>>(lines: I) -> Self {
            Self {
                sent: Vec::new(),
                lines: lines
                    .into_iter()
                    .map(|l| Ok(Some(l.to_string())))
                    .collect(),
                shutdowns: 0,
            }
        }
    }

    impl BatchTransport for Script {
        async fn send(&mut self, line: &[u8]) -> io::Result<()> {
            self.sent.push(String::from_utf8(line.to_vec()).unwrap());
            Ok(())
        }

        async fn recv(&mut self) -> io::Result<Option<String>> {
            self.lines.pop_front().unwrap_or(Ok(None))
        }

        async fn shutdown(&mut self) {
            self.shutdowns += 1;
        }
    }

    fn cmd(tokens: &[&str]) -> Command {
        Command::from_tokens(tokens.iter().copied()).unwrap()
    }

    #[test]
    fn encodes_verb_unquoted_and_args_quoted() {
        let line = encode(&cmd(&["convert", "in.png", "out.png"]));
        assert_eq!(line, format!(r#"convert "in.png" "out.png"{EOL}"#));
    }

    #[test]
    fn encodes_embedded_quotes_doubled() {
        let line = encode(&cmd(&[
            "convert",
            "in.png",
            "-draw",
            r#"text 50 100 "NO IMAGE""#,
            "out.png",
        ]));
        assert_eq!(
            line,
            format!(r#"convert "in.png" "-draw" "text 50 100 ""NO IMAGE""" "out.png"{EOL}"#)
        );
    }

    #[test]
    fn encodes_verb_only_command() {
        assert_eq!(encode(&cmd(&["ping"])), format!("ping{EOL}"));
    }

    #[test]
    fn encoding_round_trips_through_undoubling() {
        // Decode the wire form the way gm's windows escaping does and check
        // every token comes back exactly, including embedded quotes.
        let tokens = ["convert", r#"a"b"#, r#""start"#, r#"end""#, r#""""#];
        let line = encode(&cmd(&tokens));
        let line = line.strip_suffix(EOL).unwrap();

        let mut decoded = Vec::new();
        let (verb, rest) = line.split_once(' ').unwrap();
        decoded.push(verb.to_string());
        let mut chars = rest.chars().peekable();
        while chars.peek() == Some(&'"') {
            chars.next();
            let mut token = String::new();
            loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                        token.push('"');
                    }
                    Some('"') => break,
                    Some(c) => token.push(c),
                    None => panic!("unterminated token"),
                }
            }
            decoded.push(token);
            if chars.peek() == Some(&' ') {
                chars.next();
            }
        }
        assert_eq!(decoded, tokens);
    }

    #[tokio::test]
    async fn success_joins_lines_and_trims_terminator() {
        let script = Script::new(["l1", "l2", "OK"]);
        let mut conn = BasicConnection::new(script);
        let output = conn.execute(&cmd(&["identify", "x.png"])).await.unwrap();
        assert_eq!(output, format!("l1{EOL}l2"));
    }

    #[tokio::test]
    async fn success_with_no_output_is_empty() {
        let script = Script::new(["OK"]);
        let mut conn = BasicConnection::new(script);
        let output = conn.execute(&cmd(&["ping"])).await.unwrap();
        assert_eq!(output, "");
    }

    #[tokio::test]
    async fn blank_output_lines_are_preserved() {
        let script = Script::new(["a", "", "b", "OK"]);
        let mut conn = BasicConnection::new(script);
        let output = conn.execute(&cmd(&["identify", "x.png"])).await.unwrap();
        assert_eq!(output, format!("a{EOL}{EOL}b"));
    }

    #[tokio::test]
    async fn failure_ending_in_marker_is_io_failure() {
        let script = Script::new(["unable to open image [in.png].", "NG"]);
        let mut conn = BasicConnection::new(script);
        let err = conn.execute(&cmd(&["convert", "in.png"])).await.unwrap_err();
        match err {
            Error::GmIoFailure { output } => {
                assert_eq!(output, "unable to open image [in.png].")
            }
            other => panic!("expected GmIoFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_failure_is_command_failure() {
        let script = Script::new(["other", "NG"]);
        let mut conn = BasicConnection::new(script);
        let err = conn.execute(&cmd(&["convert", "in.png"])).await.unwrap_err();
        assert!(matches!(err, Error::GmCommandFailure { output } if output == "other"));
    }

    #[tokio::test]
    async fn eof_before_sentinel_is_stream_closed() {
        let script = Script::new(["partial line"]);
        let mut conn = BasicConnection::new(script);
        let err = conn.execute(&cmd(&["convert", "in.png"])).await.unwrap_err();
        assert!(matches!(err, Error::StreamClosed { partial } if partial == "partial line"));
    }

    #[tokio::test]
    async fn execute_raw_sends_verbatim() {
        let script = Script::new(["OK"]);
        let mut conn = BasicConnection::new(script);
        conn.execute_raw(r#"convert in.png out.png"#).await.unwrap();
        let sent = &conn.transport.as_ref().unwrap().sent;
        assert_eq!(sent[0], format!("convert in.png out.png{EOL}"));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_terminates_once() {
        let script = Script::new([]);
        let mut conn = BasicConnection::new(script);
        assert!(!conn.is_closed());
        conn.close().await;
        assert!(conn.is_closed());
        conn.close().await;
        // The transport was consumed on the first close, so shutdown ran at
        // most once by construction; executing now fails fast.
        let err = conn.execute(&cmd(&["ping"])).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn oversized_response_resets_the_buffer() {
        let big = "x".repeat(NORMAL_BUFFER_SIZE);
        let big_leaked: &'static str = Box::leak(big.into_boxed_str());
        let script = Script::new([big_leaked, "more", "OK"]);
        let mut conn = BasicConnection::new(script);
        let output = conn.execute(&cmd(&["identify", "x.png"])).await.unwrap();
        assert_eq!(output.len(), NORMAL_BUFFER_SIZE + EOL.len() + 4);
        assert!(conn.buffer.capacity() <= NORMAL_BUFFER_SIZE);

        // The connection still works after the reset.
        conn.transport
            .as_mut()
            .unwrap()
            .lines
            .push_back(Ok(Some("OK".to_string())));
        assert_eq!(conn.execute(&cmd(&["ping"])).await.unwrap(), "");
    }
}
