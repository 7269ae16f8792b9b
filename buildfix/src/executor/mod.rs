//! Build execution
//!
//! One call to [`BuildRunner::run`] is one build attempt. Output lines are
//! forwarded to the caller's [`LogSink`] as they arrive and also buffered in
//! the returned [`BuildOutcome`] so the classifier can read them afterwards.

pub mod docker;

pub use docker::DockerExecutor;

use crate::sink::LogSink;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Inputs for a single build attempt
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Path to the build-instruction file
    pub build_spec: PathBuf,
    pub context_dir: PathBuf,
    pub image_tag: String,
    /// Per-attempt wall-clock limit; `None` waits forever
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub stream: Stream,
    pub text: String,
}

impl OutputLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stream: Stream::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stream: Stream::Stderr,
            text: text.into(),
        }
    }
}

/// Result of a build that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutcome {
    pub succeeded: bool,
    pub exit_code: Option<i32>,
    /// Every line in arrival order, both streams interleaved
    pub lines: Vec<OutputLine>,
    /// Stderr lines joined with `\n`
    pub error_text: String,
}

impl BuildOutcome {
    /// Assemble an outcome from collected lines; `error_text` is derived.
    pub fn from_lines(exit_code: Option<i32>, lines: Vec<OutputLine>) -> Self {
        let error_text = lines
            .iter()
            .filter(|l| l.stream == Stream::Stderr)
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            succeeded: exit_code == Some(0),
            exit_code,
            lines,
            error_text,
        }
    }

    /// Raw text of every line, in order.
    pub fn raw_lines(&self) -> Vec<String> {
        self.lines.iter().map(|l| l.text.clone()).collect()
    }

    /// Text to classify: stderr, or the whole output when stderr was empty.
    pub fn classification_text(&self) -> String {
        if self.error_text.trim().is_empty() {
            self.raw_lines().join("\n")
        } else {
            self.error_text.clone()
        }
    }
}

/// Reasons an attempt produced no usable outcome
#[derive(Debug, thiserror::Error)]
pub enum BuildRunnerError {
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("build attempt timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("build cancelled")]
    Cancelled,

    /// The tool launched but reported it cannot build (daemon down, etc.)
    #[error("`{program}` is not usable: {detail}")]
    ToolUnavailable { program: String, detail: String },

    #[error("I/O error while running build: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs one build attempt.
#[async_trait]
pub trait BuildRunner: Send + Sync {
    async fn run(
        &self,
        request: &BuildRequest,
        sink: &dyn LogSink,
        cancel: &CancellationToken,
    ) -> Result<BuildOutcome, BuildRunnerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_text_is_stderr_only() {
        let outcome = BuildOutcome::from_lines(
            Some(1),
            vec![
                OutputLine::stdout("#1 [internal] load build definition"),
                OutputLine::stderr("ERROR: failed to solve"),
                OutputLine::stderr("\"/app.py\": not found"),
            ],
        );
        assert!(!outcome.succeeded);
        assert_eq!(outcome.error_text, "ERROR: failed to solve\n\"/app.py\": not found");
        assert_eq!(outcome.classification_text(), outcome.error_text);
    }

    #[test]
    fn test_classification_falls_back_to_full_output() {
        let outcome = BuildOutcome::from_lines(
            Some(1),
            vec![
                OutputLine::stdout("step 1"),
                OutputLine::stdout("invalid file request .dockerignore"),
            ],
        );
        assert_eq!(
            outcome.classification_text(),
            "step 1\ninvalid file request .dockerignore"
        );
    }

    #[test]
    fn test_exit_zero_is_success() {
        assert!(BuildOutcome::from_lines(Some(0), Vec::new()).succeeded);
        assert!(!BuildOutcome::from_lines(None, Vec::new()).succeeded);
    }

    #[test]
    fn test_runner_error_messages() {
        let err = BuildRunnerError::Timeout { seconds: 30 };
        assert_eq!(err.to_string(), "build attempt timed out after 30s");
        let err = BuildRunnerError::Launch {
            program: "docker".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().starts_with("failed to launch `docker`"));
    }
}
