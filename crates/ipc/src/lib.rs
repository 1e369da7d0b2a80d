//! dyndesk IPC Protocol
//!
//! Shared types for daemon-CLI communication over a Unix domain socket.
//! Each message is one line of JSON.

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// File name of the daemon socket inside the runtime directory.
pub const SOCKET_NAME: &str = "dyndesk.sock";

/// Maximum size of a single IPC message in bytes.
pub const MAX_IPC_MESSAGE_SIZE: u64 = 64 * 1024;

/// Path of the daemon socket: `$XDG_RUNTIME_DIR/dyndesk.sock`, or the temp dir when
/// no runtime directory is available.
pub fn socket_path() -> PathBuf {
    BaseDirs::new()
        .and_then(|dirs| dirs.runtime_dir().map(|dir| dir.to_path_buf()))
        .unwrap_or_else(std::env::temp_dir)
        .join(SOCKET_NAME)
}

/// Errors encoding or decoding a protocol line.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message exceeds the 64 KiB limit")]
    TooLarge,

    #[error("Empty message")]
    Empty,
}

/// Commands that can be sent from the CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcCommand {
    /// Run a reconciliation pass now.
    Reconcile,
    /// Compute the next pass without applying it.
    Plan,
    /// List the desktops and the current view.
    QueryDesktops,
    /// Query daemon statistics and effective configuration.
    QueryStatus,
    /// Reload configuration from file.
    Reload,
    /// Stop the daemon.
    Stop,
}

/// One desktop as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesktopInfo {
    /// 1-based position.
    pub index: usize,
    pub label: String,
}

/// Summary of a completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    /// What started the pass.
    pub trigger: String,
    pub removed_gaps: usize,
    pub truncated: usize,
    pub appended: usize,
    pub relabeled: usize,
    /// Desktop count after the pass.
    pub desktop_count: usize,
}

/// Responses from the daemon to the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IpcResponse {
    /// Command executed successfully.
    Ok,
    /// Command failed with an error.
    Error {
        /// Error message describing what went wrong.
        message: String,
    },
    /// Desktop listing.
    Desktops {
        /// 1-based index of the viewed desktop.
        current: usize,
        desktops: Vec<DesktopInfo>,
    },
    /// Dry-run result.
    Plan {
        /// Gap desktops that would be removed, highest first.
        gap_removals: Vec<usize>,
        /// Desktop count after the pass.
        needed: usize,
        /// Desktops that would be removed from the end.
        truncate: usize,
        /// Desktops that would be appended.
        append: usize,
        /// True when only labels would change.
        noop: bool,
    },
    /// A pass requested over IPC finished.
    PassCompleted { summary: PassSummary },
    /// Daemon status.
    Status {
        /// Completed passes since startup.
        passes: u64,
        /// Notifications dropped because a pass was running.
        suppressed: u64,
        uptime_secs: u64,
        minimum_desktops: usize,
        label_template: String,
        /// The most recent completed pass, if any.
        last_pass: Option<PassSummary>,
    },
}

impl IpcResponse {
    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Serialize a message as one protocol line, newline included.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, IpcError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    if line.len() as u64 > MAX_IPC_MESSAGE_SIZE {
        return Err(IpcError::TooLarge);
    }
    Ok(line)
}

/// Parse one protocol line. Surrounding whitespace is ignored.
pub fn decode_line<T: for<'de> Deserialize<'de>>(line: &str) -> Result<T, IpcError> {
    if line.len() as u64 > MAX_IPC_MESSAGE_SIZE {
        return Err(IpcError::TooLarge);
    }
    let line = line.trim();
    if line.is_empty() {
        return Err(IpcError::Empty);
    }
    Ok(serde_json::from_str(line)?)
}
