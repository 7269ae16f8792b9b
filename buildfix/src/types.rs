//! Data model shared by every stage of the auto-fix loop.
//!
//! `BuildError` is produced by the classifier, `AttemptRecord` and
//! `RemediationResult` are owned by the retry controller and returned to
//! the caller when a session terminates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Failure taxonomy for build-tool output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A path referenced by the build does not exist in the context
    MissingFile,
    /// The build tool or a build step was denied access
    Permission,
    /// The build-instruction file does not parse
    Syntax,
    /// Tooling, daemon, base image or package resolution problem
    Dependency,
    /// Image repository/tag contains uppercase characters
    TagCase,
    /// Output did not match any known pattern
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingFile => write!(f, "missing_file"),
            Self::Permission => write!(f, "permission"),
            Self::Syntax => write!(f, "syntax"),
            Self::Dependency => write!(f, "dependency"),
            Self::TagCase => write!(f, "tag_case"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// The classifier's first guess at a fix. The planner may override it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    GenerateFile,
    RemoveInstruction,
    StripIgnoreFile,
    StripConfigFile,
    FixTagCase,
    ManualFix,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GenerateFile => write!(f, "generate_file"),
            Self::RemoveInstruction => write!(f, "remove_instruction"),
            Self::StripIgnoreFile => write!(f, "strip_ignore_file"),
            Self::StripConfigFile => write!(f, "strip_config_file"),
            Self::FixTagCase => write!(f, "fix_tag_case"),
            Self::ManualFix => write!(f, "manual_fix"),
        }
    }
}

/// A classified build failure.
///
/// `missing_path` is present exactly when `kind` is [`ErrorKind::MissingFile`];
/// the constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BuildErrorRecord")]
pub struct BuildError {
    kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    missing_path: Option<String>,
    raw_message: String,
    severity: Severity,
    suggested_action: SuggestedAction,
}

/// Wire shape of [`BuildError`], checked before it becomes one.
#[derive(Deserialize)]
struct BuildErrorRecord {
    kind: ErrorKind,
    #[serde(default)]
    missing_path: Option<String>,
    raw_message: String,
    severity: Severity,
    suggested_action: SuggestedAction,
}

impl TryFrom<BuildErrorRecord> for BuildError {
    type Error = String;

    fn try_from(record: BuildErrorRecord) -> Result<Self, Self::Error> {
        match (record.kind, record.missing_path) {
            (ErrorKind::MissingFile, Some(path)) => Ok(Self::missing_file(
                path,
                record.raw_message,
                record.severity,
                record.suggested_action,
            )),
            (ErrorKind::MissingFile, None) => {
                Err("missing_file error requires missing_path".to_string())
            }
            (kind, Some(_)) => Err(format!("{:?} error must not carry missing_path", kind)),
            (kind, None) => Ok(Self::new(
                kind,
                record.raw_message,
                record.severity,
                record.suggested_action,
            )),
        }
    }
}

impl BuildError {
    /// Create a non-path error. Use [`BuildError::missing_file`] for `MissingFile`;
    /// a `MissingFile` kind passed here has no path and is recorded as `Unknown`.
    pub fn new(
        kind: ErrorKind,
        raw_message: impl Into<String>,
        severity: Severity,
        suggested_action: SuggestedAction,
    ) -> Self {
        let kind = match kind {
            ErrorKind::MissingFile => ErrorKind::Unknown,
            other => other,
        };
        Self {
            kind,
            missing_path: None,
            raw_message: raw_message.into(),
            severity,
            suggested_action,
        }
    }

    pub fn missing_file(
        path: impl Into<String>,
        raw_message: impl Into<String>,
        severity: Severity,
        suggested_action: SuggestedAction,
    ) -> Self {
        Self {
            kind: ErrorKind::MissingFile,
            missing_path: Some(path.into()),
            raw_message: raw_message.into(),
            severity,
            suggested_action,
        }
    }

    /// The record synthesized when nothing in the output is recognized.
    pub fn unrecognized(raw_message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Unknown,
            raw_message,
            Severity::Critical,
            SuggestedAction::ManualFix,
        )
    }

    /// The record used when the build tool cannot be run at all.
    pub fn tool_failure(raw_message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Dependency,
            raw_message,
            Severity::Critical,
            SuggestedAction::ManualFix,
        )
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn missing_path(&self) -> Option<&str> {
        self.missing_path.as_deref()
    }

    pub fn raw_message(&self) -> &str {
        &self.raw_message
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn suggested_action(&self) -> SuggestedAction {
        self.suggested_action
    }
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.missing_path {
            Some(path) => write!(f, "{} `{}` ({})", self.kind, path, self.severity),
            None => write!(f, "{} ({})", self.kind, self.severity),
        }
    }
}

/// One build invocation and what it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-indexed
    pub attempt_number: u32,
    pub succeeded: bool,
    /// stdout and stderr lines in arrival order
    pub raw_log_lines: Vec<String>,
    pub errors_found: Vec<BuildError>,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// A file written into the build context by a remediation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
    pub reason: String,
}

/// Audit entry for one applied remediation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedRemediation {
    /// The attempt whose failure triggered this remediation
    pub attempt_number: u32,
    pub action: String,
    pub descriptions: Vec<String>,
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Still running (only observable before the session returns)
    Pending,
    Success,
    /// No classified error had a viable remediation
    Unfixable,
    /// Attempt budget or session deadline used up
    Exhausted,
    Cancelled,
    /// Hard failure: build tool unusable, attempt timeout, or filesystem error
    Aborted,
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Unfixable => write!(f, "unfixable"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Terminal value of a remediation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationResult {
    pub session_id: Uuid,
    pub succeeded: bool,
    pub outcome: SessionOutcome,
    pub attempts: Vec<AttemptRecord>,
    pub generated_files: Vec<GeneratedFile>,
    pub removed_instructions: Vec<String>,
    pub remediations: Vec<AppliedRemediation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_build_spec_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_reason: Option<String>,
    pub duration_ms: u64,
}

impl RemediationResult {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            succeeded: false,
            outcome: SessionOutcome::Pending,
            attempts: Vec::new(),
            generated_files: Vec::new(),
            removed_instructions: Vec::new(),
            remediations: Vec::new(),
            final_build_spec_text: None,
            terminal_reason: None,
            duration_ms: 0,
        }
    }

    /// Every error seen across all attempts, in order.
    pub fn all_errors(&self) -> impl Iterator<Item = &BuildError> {
        self.attempts.iter().flat_map(|a| a.errors_found.iter())
    }

    /// One-line summary for logs and the CLI.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} after {} attempt(s): {} file(s) generated, {} instruction(s) removed",
            self.outcome,
            self.attempts.len(),
            self.generated_files.len(),
            self.removed_instructions.len()
        );
        if let Some(reason) = &self.terminal_reason {
            line.push_str(&format!(" ({})", reason));
        }
        line
    }
}

impl Default for RemediationResult {
    fn default() -> Self {
        Self::new()
    }
}
