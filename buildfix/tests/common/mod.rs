//! Deterministic fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use buildfix::content::{ContentGenerator, ContentRequest, GeneratedContent, GeneratorError};
use buildfix::executor::{BuildOutcome, BuildRequest, BuildRunner, BuildRunnerError, OutputLine};
use buildfix::sink::LogSink;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// One scripted build attempt.
#[derive(Debug, Clone)]
pub enum Step {
    /// Exit 1 with these stderr lines
    Fail(Vec<String>),
    Succeed,
    LaunchError,
    Timeout,
    /// Block until the token fires
    WaitForCancel,
}

impl Step {
    pub fn fail(line: &str) -> Self {
        Self::Fail(vec![line.to_string()])
    }
}

/// Plays back `Step`s in order; the last step repeats once the script runs out.
pub struct ScriptedRunner {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Step>,
    /// Build-instruction text as each attempt saw it
    pub specs_seen: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            last: Mutex::new(Step::Succeed),
            specs_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.specs_seen.lock().unwrap().len()
    }
}

#[async_trait]
impl BuildRunner for ScriptedRunner {
    async fn run(
        &self,
        request: &BuildRequest,
        sink: &dyn LogSink,
        cancel: &CancellationToken,
    ) -> Result<BuildOutcome, BuildRunnerError> {
        let spec = std::fs::read_to_string(&request.build_spec).unwrap_or_default();
        self.specs_seen.lock().unwrap().push(spec);

        let step = {
            let mut steps = self.steps.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            if let Some(step) = steps.pop_front() {
                *last = step.clone();
            }
            last.clone()
        };

        match step {
            Step::Succeed => {
                sink.line("#5 exporting to image");
                Ok(BuildOutcome::from_lines(
                    Some(0),
                    vec![OutputLine::stdout("#5 exporting to image")],
                ))
            }
            Step::Fail(stderr) => {
                let mut lines = vec![OutputLine::stdout("#1 [internal] load build definition")];
                sink.line("#1 [internal] load build definition");
                for line in stderr {
                    sink.line(&line);
                    lines.push(OutputLine::stderr(line));
                }
                Ok(BuildOutcome::from_lines(Some(1), lines))
            }
            Step::LaunchError => Err(BuildRunnerError::Launch {
                program: "docker".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
            }),
            Step::Timeout => Err(BuildRunnerError::Timeout { seconds: 5 }),
            Step::WaitForCancel => {
                cancel.cancelled().await;
                Err(BuildRunnerError::Cancelled)
            }
        }
    }
}

/// Always answers with the same content and remembers what it was asked.
pub struct FixedGenerator {
    pub content: String,
    pub requests: Mutex<Vec<ContentRequest>>,
}

impl FixedGenerator {
    pub fn new(content: &str) -> Self {
        Self {
            content: content.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ContentGenerator for FixedGenerator {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn generate(&self, request: &ContentRequest) -> Result<GeneratedContent, GeneratorError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(GeneratedContent {
            content: self.content.clone(),
        })
    }
}

pub struct FailingGenerator;

#[async_trait]
impl ContentGenerator for FailingGenerator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _request: &ContentRequest) -> Result<GeneratedContent, GeneratorError> {
        Err(GeneratorError::Unavailable("connection refused".to_string()))
    }
}

/// Build context with a Dockerfile and the given extra files.
pub fn build_context(dockerfile: &str, files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Dockerfile"), dockerfile).unwrap();
    for (path, content) in files {
        let target = dir.path().join(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(target, content).unwrap();
    }
    dir
}

pub fn read(dir: &Path, path: &str) -> String {
    std::fs::read_to_string(dir.join(path)).unwrap()
}
