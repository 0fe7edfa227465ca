//! Command values sent to gm batch mode.
//!
//! A [`Command`] is an ordered, non-empty sequence of string tokens: the verb
//! (`convert`, `identify`, ...) followed by its arguments. Commands are plain
//! values with no knowledge of pools or connections; the connection layer
//! decides how to put them on the wire.
//!
//! # Example
//!
//! ```
//! use gmbatch::Command;
//!
//! let cmd = Command::new("convert")
//!     .arg("in.png")
//!     .arg("-resize")
//!     .arg("120x120")
//!     .arg("out.png");
//! assert_eq!(cmd.verb(), "convert");
//! assert_eq!(cmd.tokens().len(), 5);
//! ```

use crate::{Error, Result};

/// An ordered, non-empty sequence of command tokens.
///
/// Non-emptiness is enforced by construction: [`Command::new`] takes the verb,
/// and [`Command::from_tokens`] validates its input. Once built, a command is
/// only ever read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    tokens: Vec<String>,
}

impl Command {
    /// Create a new command from its verb (the first, unquoted token).
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            tokens: vec![verb.into()],
        }
    }

    /// Build a command from a full token list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCommand`] if the list is empty.
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        if tokens.is_empty() {
            return Err(Error::InvalidCommand(
                "command must have at least one token".into(),
            ));
        }
        Ok(Self { tokens })
    }

    /// Append a single argument token.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.tokens.push(arg.into());
        self
    }

    /// Append several argument tokens.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens.extend(args.into_iter().map(Into::into));
        self
    }

    /// The command verb (first token).
    pub fn verb(&self) -> &str {
        &self.tokens[0]
    }

    /// All tokens, verb first.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

impl TryFrom<Vec<String>> for Command {
    type Error = Error;

    fn try_from(tokens: Vec<String>) -> Result<Self> {
        Command::from_tokens(tokens)
    }
}
