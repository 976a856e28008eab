//! Error type definitions for the playlist curator
//!
//! Two tiers: [`CuratorError`] covers fatal, run-aborting conditions, while
//! [`ProbeError`] covers per-URL failures that the probe layer converts into
//! degraded `ProbeResult`s instead of propagating. Probe errors never cross a
//! task boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal, run-level errors.
#[derive(Error, Debug)]
pub enum CuratorError {
    /// The playlist could not be decoded as UTF-8 or the configured fallback
    /// encoding.
    #[error("Unreadable playlist file: {}", path.display())]
    UnreadableFile { path: PathBuf },

    /// Parsing produced zero channels; nothing to curate.
    #[error("No channels found in playlist: {}", path.display())]
    EmptyPlaylist { path: PathBuf },

    /// Filesystem failures reading the input or writing the output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration file or values.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CuratorError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Per-URL probe failures. Local and recoverable: each variant downgrades a
/// single URL's result to "unreachable" or "unknown quality".
#[derive(Error, Debug)]
pub enum ProbeError {
    /// A probe stage exceeded its time budget.
    #[error("Probe timed out after {seconds}s: {url}")]
    Timeout { url: String, seconds: u64 },

    /// The external introspection tool is not installed or not on the
    /// resolvable command path.
    #[error("Introspection tool unavailable: {tool}")]
    ToolUnavailable { tool: String },
}

impl ProbeError {
    pub fn timeout<U: Into<String>>(url: U, seconds: u64) -> Self {
        Self::Timeout {
            url: url.into(),
            seconds,
        }
    }

    pub fn tool_unavailable<T: Into<String>>(tool: T) -> Self {
        Self::ToolUnavailable { tool: tool.into() }
    }
}
