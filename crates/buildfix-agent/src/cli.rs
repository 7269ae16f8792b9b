use anyhow::{Context, Result};
use buildfix::{EngineConfig, SessionRequest};
use clap::Parser;
use std::path::PathBuf;

/// Build a container image, fixing common build-context problems between attempts
#[derive(Parser, Debug)]
#[command(name = "buildfix", author, version, about, long_about = None)]
pub struct Args {
    /// Build context directory
    pub context: PathBuf,

    /// Image tag passed to the build tool
    #[arg(short = 't', long)]
    pub tag: String,

    /// Build-instruction file (defaults to <CONTEXT>/Dockerfile)
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Maximum build attempts (overrides BUILDFIX_MAX_ATTEMPTS)
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Per-attempt timeout in seconds, 0 to disable
    #[arg(long)]
    pub attempt_timeout: Option<u64>,

    /// Whole-session timeout in seconds
    #[arg(long)]
    pub session_timeout: Option<u64>,

    /// Engine config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the session result as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Do not check the build tool before starting
    #[arg(long, default_value_t = false)]
    pub skip_preflight: bool,
}

impl Args {
    /// Defaults, then the config file, then `BUILDFIX_*`, then flags.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => EngineConfig::default(),
        };
        config
            .apply_env_overrides()
            .context("Invalid BUILDFIX_* environment override")?;
        self.apply_flags(&mut config);
        config.validate().context("Invalid engine configuration")?;
        Ok(config)
    }

    pub fn apply_flags(&self, config: &mut EngineConfig) {
        if let Some(max) = self.max_attempts {
            config.max_attempts = max;
        }
        if let Some(secs) = self.attempt_timeout {
            config.attempt_timeout_secs = secs;
        }
        if let Some(secs) = self.session_timeout {
            config.session_timeout_secs = Some(secs);
        }
    }

    pub fn session_request(&self) -> SessionRequest {
        let request = SessionRequest::new(&self.context, &self.tag);
        match &self.file {
            Some(file) => request.with_build_spec(file),
            None => request,
        }
    }
}
