use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the orchestration core.
///
/// Every failure reaches the caller unchanged; nothing in the core retries.
#[derive(Debug, Error)]
pub enum HiveError {
    /// One or more thoughts in a batch are malformed. Holds every violation.
    #[error("Invalid thought: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Script path not allowed: {0}")]
    PathNotAllowed(String),

    #[error("Only .{extension} scripts are allowed (got {path})")]
    UnsupportedScriptType { path: String, extension: String },

    /// The OS refused to launch the script, or its pipes broke mid-run.
    #[error("Failed to launch {script}: {source}")]
    Spawn {
        script: String,
        #[source]
        source: std::io::Error,
    },

    /// The script ran to completion with a non-zero exit (or died by signal).
    #[error("Script {script} exited with {}", describe_exit(.code))]
    ScriptFailed { script: String, code: Option<i32> },

    #[error("Storage error at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No artifact found: {0}")]
    ArtifactMissing(String),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl HiveError {
    /// Wraps an I/O failure on the given path as a storage error.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// True when the caller can fix the problem by changing its input.
    ///
    /// Validation and path rejections are client errors; spawn, script
    /// and storage failures are server-side.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::PathNotAllowed(_) | Self::UnsupportedScriptType { .. }
        )
    }
}
