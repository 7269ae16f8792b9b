use anyhow::{Context, Result};
use buildfix::{DockerExecutor, RemediationPlanner, RemediationResult, RetryController};
use buildfix_agent::{check_endpoint, Args, GeneratorEndpoint, HttpContentGenerator};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("buildfix: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> Result<bool> {
    let config = args.engine_config()?;
    let request = args.session_request();
    info!(
        context = %request.context_dir.display(),
        spec = %request.build_spec.display(),
        tag = %request.image_tag,
        max_attempts = config.max_attempts,
        "buildfix starting"
    );

    let executor = DockerExecutor::new(&config.build_tool).with_build_args(config.build_args.clone());
    if !args.skip_preflight {
        let version = executor.preflight().await.with_context(|| {
            format!(
                "`{}` is not ready (start the daemon or pass --skip-preflight)",
                config.build_tool
            )
        })?;
        info!(%version, "build tool ready");
    }

    let mut controller = RetryController::new(Arc::new(executor), config.to_session_config())
        .with_planner(RemediationPlanner::new(config.policy.clone()));

    if let Some(endpoint) = GeneratorEndpoint::from_env() {
        if !check_endpoint(&endpoint).await {
            warn!(url = %endpoint.url, "content generator not reachable, placeholders will be used on failure");
        }
        info!(url = %endpoint.url, model = %endpoint.model, "using content generator");
        let generator =
            HttpContentGenerator::new(endpoint).context("Failed to build generator HTTP client")?;
        controller = controller.with_generator(Arc::new(generator));
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling session");
                cancel.cancel();
            }
        });
    }

    let json = args.json;
    let log = move |line: &str| {
        if json {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    };
    let progress = |percent: u8| tracing::debug!(percent, "session progress");

    let result = controller.run(&request, &log, &progress, &cancel).await;

    if json {
        let text = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
        println!("{text}");
    } else {
        print_report(&result);
    }
    Ok(result.succeeded)
}

fn print_report(result: &RemediationResult) {
    println!();
    println!("{}", result.summary());
    for file in &result.generated_files {
        println!("  generated {} ({})", file.path, file.reason);
    }
    for line in &result.removed_instructions {
        println!("  removed   {}", line);
    }
}
