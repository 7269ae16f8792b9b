//! Command-line agent around the buildfix engine.
//!
//! - [`cli`]: argument parsing and config resolution
//! - [`config`]: content-generator endpoint settings
//! - [`generator`]: OpenAI-compatible content generator

pub mod cli;
pub mod config;
pub mod generator;

pub use cli::Args;
pub use config::{check_endpoint, GeneratorEndpoint};
pub use generator::{strip_code_fences, HttpContentGenerator};
