//! Hard-failure error types.
//!
//! Classification and planning never produce these; they only cover the
//! conditions that stop a session outright (filesystem access, paths that
//! escape the build context, invalid configuration).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Reading or writing inside the build context failed
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A remediation targeted a path outside the build context
    #[error("path `{path}` escapes the build context")]
    PathEscapesContext { path: String },

    /// A generated file would replace different content already on disk
    #[error("refusing to overwrite existing file `{path}`")]
    WouldOverwrite { path: String },

    /// Configuration could not be parsed
    #[error("Invalid engine configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration parsed but is not usable
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mentions_path() {
        let err = EngineError::io(
            "/ctx/Dockerfile",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/ctx/Dockerfile"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_escape_error_display() {
        let err = EngineError::PathEscapesContext {
            path: "../etc/passwd".to_string(),
        };
        assert_eq!(err.to_string(), "path `../etc/passwd` escapes the build context");
    }
}
