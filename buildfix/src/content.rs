//! Content generation boundary.
//!
//! The engine only decides *that* a file must be written and *where*; what
//! goes in it comes from a [`ContentGenerator`]. When the generator fails the
//! session falls back to [`placeholder_for`], which depends on nothing but
//! the file extension.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse category of a file the planner decided to synthesize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Config,
    Docs,
    Rules,
    Source,
    Other,
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config => write!(f, "config"),
            Self::Docs => write!(f, "docs"),
            Self::Rules => write!(f, "rules"),
            Self::Source => write!(f, "source"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Input to a content generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRequest {
    /// Path relative to the build context
    pub path: String,
    pub file_type: FileType,
    /// Short description of the project (detected stack, file listing)
    pub project_context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub content: String,
}

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("content generator unavailable: {0}")]
    Unavailable(String),

    #[error("content generator request failed: {0}")]
    Request(String),

    #[error("content generator returned no content")]
    EmptyResponse,
}

/// Produces the content of a missing file.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Name for logs
    fn name(&self) -> &str;

    async fn generate(&self, request: &ContentRequest) -> Result<GeneratedContent, GeneratorError>;
}

/// Deterministic generator backed by [`placeholder_for`]. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderGenerator;

#[async_trait]
impl ContentGenerator for PlaceholderGenerator {
    fn name(&self) -> &str {
        "placeholder"
    }

    async fn generate(&self, request: &ContentRequest) -> Result<GeneratedContent, GeneratorError> {
        Ok(GeneratedContent {
            content: placeholder_for(&request.path),
        })
    }
}

/// Lower-cased extension of a context path, if any.
pub fn extension(path: &str) -> Option<String> {
    let name = path.trim_end_matches('/').rsplit('/').next().unwrap_or(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Minimal non-empty placeholder keyed only by file extension.
pub fn placeholder_for(path: &str) -> String {
    let content = match extension(path).as_deref() {
        Some("json") => "{}\n",
        Some("yaml") | Some("yml") => "# placeholder\n{}\n",
        Some("toml") | Some("conf") | Some("cfg") | Some("properties") | Some("env") => {
            "# placeholder\n"
        }
        Some("ini") => "; placeholder\n",
        Some("xml") => "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<placeholder/>\n",
        Some("md") => "# Placeholder\n",
        Some("txt") | Some("rst") => "placeholder\n",
        Some("html") | Some("htm") => {
            "<!DOCTYPE html>\n<html><head><title>placeholder</title></head><body></body></html>\n"
        }
        Some("css") | Some("scss") => "/* placeholder */\n",
        Some("js") | Some("cjs") | Some("mjs") => "module.exports = {};\n",
        Some("ts") | Some("tsx") | Some("jsx") => "export {};\n",
        Some("py") => "# placeholder\n",
        Some("rb") => "# placeholder\n",
        Some("go") => "package main\n",
        Some("sh") => "#!/bin/sh\nexit 0\n",
        Some("sql") => "-- placeholder\n",
        _ => "# placeholder\n",
    };
    content.to_string()
}

/// Minimal safe replacement for a support file, if one is known.
pub fn support_file_template(file_name: &str) -> Option<&'static str> {
    match file_name {
        ".dockerignore" => Some(".git\nnode_modules\nnpm-debug.log\n"),
        ".npmrc" => Some("registry=https://registry.npmjs.org/\n"),
        ".yarnrc" => Some("registry \"https://registry.yarnpkg.com\"\n"),
        ".yarnrc.yml" => Some("nodeLinker: node-modules\n"),
        _ => None,
    }
}
