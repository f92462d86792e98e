//! Test execution errors.

use cloudinfo::CloudInfoError;
use std::time::Duration;
use thiserror::Error;

/// Maximum number of stderr bytes kept in command errors.
pub(crate) const MAX_STDERR_LEN: usize = 4096;

/// Failure of an external command (`terraform`, `git`).
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("'{command}' produced unexpected output: {message}")]
    InvalidOutput { command: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a consistency or upgrade run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Invalid test options: {0}")]
    Options(String),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Failed to prepare working copy: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("Post-apply hook failed: {0}")]
    Hook(String),

    #[error("Consistency check failed, unexpected changes: {}", .0.join(", "))]
    Inconsistent(Vec<String>),

    #[error("Upgrade would destroy or replace resources: {}", .0.join(", "))]
    UpgradeDestroys(Vec<String>),

    #[error(transparent)]
    CloudInfo(#[from] CloudInfoError),
}

/// Ingress health check failure.
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("Ingress of cluster '{cluster}' not healthy after {timeout:?}: status '{status}'{}", .message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default())]
    Unhealthy {
        cluster: String,
        status: String,
        message: Option<String>,
        timeout: Duration,
    },

    #[error("Ingress status of cluster '{cluster}' unavailable after {timeout:?}: {source}")]
    Query {
        cluster: String,
        timeout: Duration,
        #[source]
        source: CloudInfoError,
    },
}

/// Keep the tail of a command's stderr, where Terraform prints the error.
pub(crate) fn truncate_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= MAX_STDERR_LEN {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - MAX_STDERR_LEN;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("[truncated]...{}", trimmed.get(start..).unwrap_or_default())
}
