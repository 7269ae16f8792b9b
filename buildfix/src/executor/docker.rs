//! `docker build` (or any CLI with the same argument shape) as a [`BuildRunner`].

use super::{BuildOutcome, BuildRequest, BuildRunner, BuildRunnerError, OutputLine, Stream};
use crate::sink::LogSink;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How long `preflight` waits for `<program> version`.
const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct DockerExecutor {
    program: String,
    build_args: Vec<String>,
}

impl Default for DockerExecutor {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerExecutor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            build_args: Vec::new(),
        }
    }

    /// Extra arguments placed right after `build`, e.g. `--progress=plain`.
    pub fn with_build_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.build_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, request: &BuildRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("build")
            .args(&self.build_args)
            .arg("-f")
            .arg(&request.build_spec)
            .arg("-t")
            .arg(&request.image_tag)
            .arg(&request.context_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so a kill reaches the whole build tree.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }

    /// Check that the build tool runs and its daemon answers.
    ///
    /// Returns the first line the tool printed.
    pub async fn preflight(&self) -> Result<String, BuildRunnerError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(PREFLIGHT_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(BuildRunnerError::Launch {
                    program: self.program.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(BuildRunnerError::Timeout {
                    seconds: PREFLIGHT_TIMEOUT.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BuildRunnerError::ToolUnavailable {
                program: self.program.clone(),
                detail: stderr.trim().to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }
}

/// Read `reader` line by line into `tx` until EOF.
async fn drain<R>(reader: R, stream: Stream, tx: mpsc::UnboundedSender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(reader).split(b'\n');
    loop {
        match segments.next_segment().await {
            Ok(Some(mut bytes)) => {
                if bytes.last() == Some(&b'\r') {
                    bytes.pop();
                }
                let text = String::from_utf8_lossy(&bytes).into_owned();
                if tx.send(OutputLine { stream, text }).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(?stream, error = %e, "stopped reading build output");
                break;
            }
        }
    }
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "failed to kill build process");
    }
}

#[async_trait]
impl BuildRunner for DockerExecutor {
    async fn run(
        &self,
        request: &BuildRequest,
        sink: &dyn LogSink,
        cancel: &CancellationToken,
    ) -> Result<BuildOutcome, BuildRunnerError> {
        if cancel.is_cancelled() {
            return Err(BuildRunnerError::Cancelled);
        }

        tracing::info!(
            program = %self.program,
            spec = %request.build_spec.display(),
            context = %request.context_dir.display(),
            tag = %request.image_tag,
            "starting build"
        );

        let mut child = self
            .command(request)
            .spawn()
            .map_err(|source| BuildRunnerError::Launch {
                program: self.program.clone(),
                source,
            })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(drain(stdout, Stream::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain(stderr, Stream::Stderr, tx.clone()));
        }
        drop(tx);

        let timeout_secs = request.timeout.map(|t| t.as_secs()).unwrap_or_default();
        let deadline = async {
            match request.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut lines = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    terminate(&mut child).await;
                    tracing::info!("build cancelled");
                    return Err(BuildRunnerError::Cancelled);
                }
                _ = &mut deadline => {
                    terminate(&mut child).await;
                    tracing::warn!(seconds = timeout_secs, "build timed out");
                    return Err(BuildRunnerError::Timeout { seconds: timeout_secs });
                }
                line = rx.recv() => match line {
                    Some(line) => {
                        tracing::debug!(stream = ?line.stream, "{}", line.text);
                        sink.line(&line.text);
                        lines.push(line);
                    }
                    None => break,
                },
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                terminate(&mut child).await;
                return Err(BuildRunnerError::Cancelled);
            }
            _ = &mut deadline => {
                terminate(&mut child).await;
                return Err(BuildRunnerError::Timeout { seconds: timeout_secs });
            }
            status = child.wait() => status?,
        };

        let outcome = BuildOutcome::from_lines(status.code(), lines);
        tracing::info!(
            exit_code = ?outcome.exit_code,
            lines = outcome.lines.len(),
            succeeded = outcome.succeeded,
            "build finished"
        );
        Ok(outcome)
    }
}
