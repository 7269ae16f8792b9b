//! Engine configuration
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! `BUILDFIX_*` environment variables, then whatever the caller sets
//! explicitly (CLI flags). [`EngineConfig::validate`] runs last.
//!
//! ```toml
//! max_attempts = 4
//! attempt_timeout_secs = 900
//! build_tool = "podman"
//! build_args = ["--progress=plain", "--no-cache"]
//!
//! [policy]
//! excise_dirs = ["dist", "vendor"]
//! default_verdict = "excise"
//! ```

use crate::error::{EngineError, EngineResult};
use crate::planner::SynthesisPolicy;
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 1800;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Build attempts per session, including the first
    pub max_attempts: u32,
    /// Per-attempt limit; 0 disables it
    pub attempt_timeout_secs: u64,
    /// Whole-session limit checked before each re-attempt
    pub session_timeout_secs: Option<u64>,
    /// Executable invoked as `<build_tool> build ...`
    pub build_tool: String,
    pub build_args: Vec<String>,
    pub policy: SynthesisPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT_SECS,
            session_timeout_secs: None,
            build_tool: "docker".to_string(),
            build_args: vec!["--progress=plain".to_string()],
            policy: SynthesisPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Apply `BUILDFIX_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> EngineResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the environment, or a map in tests).
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> EngineResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> EngineResult<T> {
            value
                .trim()
                .parse()
                .map_err(|_| EngineError::config(format!("{key}: cannot parse `{value}`")))
        }

        if let Some(v) = lookup("BUILDFIX_MAX_ATTEMPTS") {
            self.max_attempts = parse("BUILDFIX_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("BUILDFIX_ATTEMPT_TIMEOUT_SECS") {
            self.attempt_timeout_secs = parse("BUILDFIX_ATTEMPT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("BUILDFIX_SESSION_TIMEOUT_SECS") {
            let secs: u64 = parse("BUILDFIX_SESSION_TIMEOUT_SECS", &v)?;
            self.session_timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(v) = lookup("BUILDFIX_BUILD_TOOL").filter(|v| !v.trim().is_empty()) {
            self.build_tool = v.trim().to_string();
        }
        if let Some(v) = lookup("BUILDFIX_BUILD_ARGS") {
            self.build_args = v.split_whitespace().map(String::from).collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.max_attempts == 0 {
            return Err(EngineError::config("max_attempts must be at least 1"));
        }
        if self.build_tool.trim().is_empty() {
            return Err(EngineError::config("build_tool must not be empty"));
        }
        if self.session_timeout_secs == Some(0) {
            return Err(EngineError::config(
                "session_timeout_secs must be positive when set",
            ));
        }
        Ok(())
    }

    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            max_attempts: self.max_attempts,
            attempt_timeout: (self.attempt_timeout_secs > 0)
                .then(|| Duration::from_secs(self.attempt_timeout_secs)),
            session_timeout: self.session_timeout_secs.map(Duration::from_secs),
        }
    }
}
