//! Build-output error classification
//!
//! Turns the unstructured text a container build tool prints on failure into
//! an ordered list of [`BuildError`] records. Rules are evaluated in priority
//! order so that specific patterns (a quoted missing path) are tried before
//! generic ones (a bare "not found").

use crate::types::{BuildError, ErrorKind, Severity, SuggestedAction};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Ignore-list files the planner may safely replace with a template.
pub const IGNORE_FILES: &[&str] = &[".dockerignore"];

/// Package-manager run-control files the planner may safely replace.
pub const CONFIG_FILES: &[&str] = &[".npmrc", ".yarnrc", ".yarnrc.yml"];

static DAEMON_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(cannot connect to the docker daemon|is the docker daemon running|error during connect)",
    )
    .unwrap()
});

static TAG_CASE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(repository name must be lowercase|must be lowercase)").unwrap()
});

static INVALID_FILE_REQUEST_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"invalid file request ["']?([^\s"']+)"#).unwrap());

static QUOTED_NOT_FOUND_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"\n]+)": not found"#).unwrap());

static EXCLUDED_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"file not found in build context or excluded by \.dockerignore: stat ([^\s:]+): file does not exist",
    )
    .unwrap()
});

static MISSING_DIR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"lstat [^\s:]*?buildkit-mount\d+/([^\s:]+): no such file or directory").unwrap()
});

static PERMISSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(permission denied|operation not permitted|\bEACCES\b)").unwrap()
});

static SYNTAX_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(dockerfile parse error|unknown instruction:|failed to parse dockerfile)")
        .unwrap()
});

static DEPENDENCY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(npm ERR!|\bERESOLVE\b|unable to locate package|no matching distribution found|could not find a version that satisfies|pull access denied|manifest unknown)",
    )
    .unwrap()
});

static GENERIC_NOT_FOUND_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\bnot found\b|no such file or directory)").unwrap());

/// Builds a [`BuildError`] from a rule match. Receives the captures and the
/// output line the match sits on.
pub type ErrorBuilder = fn(&Captures<'_>, &str) -> BuildError;

/// One entry in the classification table.
#[derive(Clone)]
pub struct PatternRule {
    pub name: &'static str,
    pub pattern: Regex,
    /// Generic rules only fire when no specific rule matched.
    pub generic: bool,
    pub build: ErrorBuilder,
}

impl PatternRule {
    pub fn new(name: &'static str, pattern: Regex, build: ErrorBuilder) -> Self {
        Self {
            name,
            pattern,
            generic: false,
            build,
        }
    }

    pub fn generic(mut self) -> Self {
        self.generic = true;
        self
    }
}

impl std::fmt::Debug for PatternRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternRule")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .field("generic", &self.generic)
            .finish()
    }
}

/// Classifier over a priority-ordered rule table
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: Vec<PatternRule>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier {
    /// Classifier with the built-in docker/BuildKit rule table
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    /// Append a rule after the built-in ones.
    pub fn with_rule(mut self, rule: PatternRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }

    /// Classify raw build output.
    ///
    /// Never returns an empty list: unrecognized output becomes a single
    /// `Unknown/Critical/ManualFix` record.
    pub fn classify(&self, error_text: &str) -> Vec<BuildError> {
        let mut errors = Vec::new();
        let mut specific_matched = false;

        for rule in &self.rules {
            if rule.generic && specific_matched {
                continue;
            }
            let Some(caps) = rule.pattern.captures(error_text) else {
                continue;
            };
            let whole = caps.get(0).map(|m| m.start()).unwrap_or(0);
            let line = line_at(error_text, whole);
            errors.push((rule.build)(&caps, line));
            if !rule.generic {
                specific_matched = true;
            }
        }

        if errors.is_empty() {
            errors.push(BuildError::unrecognized(last_meaningful_line(error_text)));
        }
        errors
    }
}

/// The full line of `text` containing byte offset `offset`, trimmed.
fn line_at(text: &str, offset: usize) -> &str {
    let start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let end = text[offset..]
        .find('\n')
        .map(|i| offset + i)
        .unwrap_or(text.len());
    text[start..end].trim()
}

fn last_meaningful_line(text: &str) -> &str {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("build failed without output")
}

/// File name component of a context path (`app/.npmrc` → `.npmrc`).
pub fn file_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

/// Missing-file record with the suggested action derived from the file name.
pub fn missing_file_error(path: &str, line: &str) -> BuildError {
    let name = file_name(path);
    if IGNORE_FILES.contains(&name) {
        BuildError::missing_file(path, line, Severity::Medium, SuggestedAction::StripIgnoreFile)
    } else if CONFIG_FILES.contains(&name) {
        BuildError::missing_file(path, line, Severity::Medium, SuggestedAction::StripConfigFile)
    } else {
        BuildError::missing_file(path, line, Severity::High, SuggestedAction::GenerateFile)
    }
}

fn captured_path(caps: &Captures<'_>, line: &str) -> BuildError {
    let path = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    missing_file_error(path, line)
}

fn missing_directory(caps: &Captures<'_>, line: &str) -> BuildError {
    let dir = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    BuildError::missing_file(
        format!("{}/", dir.trim_end_matches('/')),
        line,
        Severity::High,
        SuggestedAction::RemoveInstruction,
    )
}

fn default_rules() -> Vec<PatternRule> {
    vec![
        PatternRule::new("daemon_unreachable", DAEMON_PATTERN.clone(), |_, line| {
            BuildError::tool_failure(line)
        }),
        PatternRule::new("tag_case", TAG_CASE_PATTERN.clone(), |_, line| {
            BuildError::new(
                ErrorKind::TagCase,
                line,
                Severity::Medium,
                SuggestedAction::FixTagCase,
            )
        }),
        PatternRule::new(
            "invalid_file_request",
            INVALID_FILE_REQUEST_PATTERN.clone(),
            captured_path,
        ),
        PatternRule::new(
            "quoted_not_found",
            QUOTED_NOT_FOUND_PATTERN.clone(),
            captured_path,
        ),
        PatternRule::new("excluded_by_ignore", EXCLUDED_PATTERN.clone(), captured_path),
        PatternRule::new(
            "missing_directory",
            MISSING_DIR_PATTERN.clone(),
            missing_directory,
        ),
        PatternRule::new("permission_denied", PERMISSION_PATTERN.clone(), |_, line| {
            BuildError::new(
                ErrorKind::Permission,
                line,
                Severity::High,
                SuggestedAction::ManualFix,
            )
        }),
        PatternRule::new("dockerfile_syntax", SYNTAX_PATTERN.clone(), |_, line| {
            BuildError::new(
                ErrorKind::Syntax,
                line,
                Severity::High,
                SuggestedAction::ManualFix,
            )
        }),
        PatternRule::new(
            "dependency_resolution",
            DEPENDENCY_PATTERN.clone(),
            |_, line| {
                BuildError::new(
                    ErrorKind::Dependency,
                    line,
                    Severity::High,
                    SuggestedAction::ManualFix,
                )
            },
        ),
        PatternRule::new(
            "generic_not_found",
            GENERIC_NOT_FOUND_PATTERN.clone(),
            |_, line| {
                BuildError::new(
                    ErrorKind::Unknown,
                    line,
                    Severity::High,
                    SuggestedAction::ManualFix,
                )
            },
        )
        .generic(),
    ]
}
