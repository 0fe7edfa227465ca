//! One-time version probe that selects gm invocation flags.
//!
//! GraphicsMagick removed the `-safe-mode` keyword in 1.3.22, and passing it
//! to a newer release is rejected outright. The probe runs `gm version` once
//! per distinct executable path, parses the reported version, and memoizes
//! the matching batch argument vector for the lifetime of the process.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tokio::process::Command;
use tokio::sync::OnceCell;

use super::{FAIL_SENTINEL, PASS_SENTINEL};
use crate::{Error, Result};

/// First GraphicsMagick release that rejects `-safe-mode`.
const SAFE_MODE_REMOVED_IN: (u32, u32, u32) = (1, 3, 22);

static CACHE: Lazy<ProbeCache> = Lazy::new(ProbeCache::new);

/// Resolve the batch-mode argument vector for a gm executable.
///
/// The first caller for a given path runs the version probe; concurrent and
/// later callers reuse the memoized result without re-invoking the tool.
///
/// # Errors
///
/// Returns [`Error::VersionProbe`] if the tool cannot be spawned or produces
/// no output line. Probe failures are not cached: a broken install that gets
/// fixed will be probed again on the next call.
pub async fn batch_args(gm_path: &str) -> Result<Arc<Vec<String>>> {
    let path = gm_path.to_string();
    CACHE
        .resolve(gm_path, move || version_first_line(path))
        .await
}

/// Per-path memoization of probe outcomes.
///
/// The version runner is injected so tests can count probe executions; the
/// production path is [`batch_args`] over the process-wide cache.
pub(crate) struct ProbeCache {
    cells: Mutex<HashMap<String, Arc<OnceCell<Arc<Vec<String>>>>>>,
}

impl ProbeCache {
    pub(crate) fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn resolve<F, Fut>(
        &self,
        gm_path: &str,
        run_version: F,
    ) -> Result<Arc<Vec<String>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let cell = {
            let mut cells = self.cells.lock().expect("probe cache lock poisoned");
            cells.entry(gm_path.to_string()).or_default().clone()
        };
        cell.get_or_try_init(|| async {
            let first_line = run_version().await?;
            let legacy = needs_safe_mode(gm_path, &first_line);
            let argv = batch_argv(gm_path, legacy);
            tracing::debug!(path = %gm_path, legacy = legacy, "resolved gm batch arguments");
            Ok(Arc::new(argv))
        })
        .await
        .cloned()
    }
}

/// Run `<path> version` and return the first line of its output.
async fn version_first_line(path: String) -> Result<String> {
    let output = Command::new(&path)
        .arg("version")
        .output()
        .await
        .map_err(|e| Error::VersionProbe {
            path: path.clone(),
            reason: e.to_string(),
        })?;

    let text = String::from_utf8_lossy(&output.stdout);
    text.lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| Error::VersionProbe {
            path,
            reason: "no output from version query".into(),
        })
}

/// Decide from the version line whether the legacy `-safe-mode` flag is
/// needed.
///
/// The version number is the second whitespace-delimited word, e.g.
/// `GraphicsMagick 1.3.23 2015-11-07 Q16 http://...`. An unparseable line is
/// treated as a modern release, since every maintained gm rejects the flag.
fn needs_safe_mode(path: &str, version_line: &str) -> bool {
    let token = version_line.split_whitespace().nth(1);
    match token.and_then(parse_version) {
        Some(version) => version < SAFE_MODE_REMOVED_IN,
        None => {
            tracing::warn!(
                path = %path,
                line = %version_line,
                "could not parse gm version, assuming a recent release"
            );
            false
        }
    }
}

/// Parse a version token like "1.3.23" or "v1.3.26-beta" into a triple.
fn parse_version(word: &str) -> Option<(u32, u32, u32)> {
    let word = word.strip_prefix('v').unwrap_or(word);
    let parts: Vec<&str> = word.split('.').collect();
    if parts.len() < 3 {
        return None;
    }
    // Take just the numeric prefix of each part (handles "23-beta" -> "23").
    let numeric = |p: &str| {
        p.chars()
            .take_while(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse::<u32>()
            .ok()
    };
    Some((numeric(parts[0])?, numeric(parts[1])?, numeric(parts[2])?))
}

/// Build the batch-mode argument vector for one gm executable.
///
/// Batch mode is configured with echo and prompt off, feedback on, fixed
/// pass/fail sentinels, and the `windows` escape convention (double quotes,
/// doubled to embed), reading commands from stdin (`-`).
fn batch_argv(gm_path: &str, safe_mode: bool) -> Vec<String> {
    let mut argv: Vec<String> = [
        gm_path,
        "batch",
        "-escape",
        "windows",
        "-feedback",
        "on",
        "-pass",
        PASS_SENTINEL,
        "-fail",
        FAIL_SENTINEL,
        "-prompt",
        "off",
        "-echo",
        "off",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    if safe_mode {
        argv.push("-safe-mode".into());
        argv.push("on".into());
    }
    argv.push("-".into());
    argv
}
