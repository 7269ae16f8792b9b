//! The retry controller: build, classify, remediate, rebuild.
//!
//! ```text
//! Idle → Attempting ─ok──────────────────────────────→ Success
//!            │ failed
//!            ▼
//!       Classifying ─no viable decision──────────────→ Unfixable
//!            │
//!            ▼
//!       Remediating ─counter > max / deadline passed──→ Exhausted
//!            │ applied, counter += 1
//!            └──────────→ Attempting
//! ```
//!
//! A session is strictly sequential. The build context is owned by the
//! session for its whole duration and only [`ContextMutator`] writes to it.

pub mod state;

pub use state::{IllegalTransition, SessionMachine, SessionState, TransitionRecord};

use crate::classifier::ErrorClassifier;
use crate::content::{placeholder_for, ContentGenerator, ContentRequest, PlaceholderGenerator};
use crate::executor::{BuildOutcome, BuildRequest, BuildRunner, BuildRunnerError};
use crate::inventory::{normalize, ContextInventory};
use crate::mutator::ContextMutator;
use crate::planner::{GenerationTarget, PlanDecision, RemediationAction, RemediationPlanner};
use crate::sink::{attempt_percent, LogSink, ProgressSink};
use crate::types::{AppliedRemediation, AttemptRecord, BuildError, RemediationResult};
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// What to build
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub build_spec: PathBuf,
    pub context_dir: PathBuf,
    pub image_tag: String,
}

impl SessionRequest {
    /// Request using `<context_dir>/Dockerfile`.
    pub fn new(context_dir: impl AsRef<Path>, image_tag: impl Into<String>) -> Self {
        let context_dir = context_dir.as_ref().to_path_buf();
        Self {
            build_spec: context_dir.join("Dockerfile"),
            context_dir,
            image_tag: image_tag.into(),
        }
    }

    pub fn with_build_spec(mut self, build_spec: impl AsRef<Path>) -> Self {
        self.build_spec = build_spec.as_ref().to_path_buf();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Builds per session including the first; values below 1 act as 1
    pub max_attempts: u32,
    pub attempt_timeout: Option<Duration>,
    pub session_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::DEFAULT_MAX_ATTEMPTS,
            attempt_timeout: Some(Duration::from_secs(
                crate::config::DEFAULT_ATTEMPT_TIMEOUT_SECS,
            )),
            session_timeout: None,
        }
    }
}

pub struct RetryController {
    runner: Arc<dyn BuildRunner>,
    generator: Arc<dyn ContentGenerator>,
    classifier: ErrorClassifier,
    planner: RemediationPlanner,
    config: SessionConfig,
}

/// Mutable state threaded through one session
struct Session<'a> {
    request: &'a SessionRequest,
    log: &'a dyn LogSink,
    machine: SessionMachine,
    result: RemediationResult,
    applied: HashSet<String>,
    started: Instant,
}

impl Session<'_> {
    fn advance(&mut self, to: SessionState, reason: Option<&str>) {
        if let Err(e) = self.machine.advance(to, reason) {
            tracing::error!(error = %e, "session state machine rejected transition");
        }
    }

    /// Move to a terminal state and record why.
    fn finish(&mut self, to: SessionState, reason: impl Into<String>) {
        let reason = reason.into();
        self.advance(to, Some(&reason));
        self.log.line(&format!("session {}: {}", to, reason));
        self.result.terminal_reason = Some(reason);
    }

    fn record_attempt(
        &mut self,
        attempt: u32,
        outcome: Option<&BuildOutcome>,
        errors: Vec<BuildError>,
        started_at: chrono::DateTime<Utc>,
        elapsed: Duration,
    ) {
        self.result.attempts.push(AttemptRecord {
            attempt_number: attempt,
            succeeded: outcome.is_some_and(|o| o.succeeded),
            raw_log_lines: outcome.map(BuildOutcome::raw_lines).unwrap_or_default(),
            errors_found: errors,
            exit_code: outcome.and_then(|o| o.exit_code),
            started_at,
            duration_ms: elapsed.as_millis() as u64,
        });
    }
}

impl RetryController {
    /// Controller with the default classifier, planner and placeholder content.
    pub fn new(runner: Arc<dyn BuildRunner>, config: SessionConfig) -> Self {
        Self {
            runner,
            generator: Arc::new(PlaceholderGenerator),
            classifier: ErrorClassifier::default(),
            planner: RemediationPlanner::default(),
            config,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn ContentGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_planner(mut self, planner: RemediationPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run one session to a terminal state.
    ///
    /// Never fails: hard failures and cancellation come back as a result with
    /// `succeeded == false` and `terminal_reason` set.
    pub async fn run(
        &self,
        request: &SessionRequest,
        log: &dyn LogSink,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> RemediationResult {
        let result = RemediationResult::new();
        let span = tracing::info_span!(
            "session",
            id = %result.session_id,
            tag = %request.image_tag,
        );
        let session = Session {
            request,
            log,
            machine: SessionMachine::new(),
            result,
            applied: HashSet::new(),
            started: Instant::now(),
        };
        self.drive(session, progress, cancel).instrument(span).await
    }

    async fn drive(
        &self,
        mut s: Session<'_>,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> RemediationResult {
        let max = self.config.max_attempts.max(1);
        let mutator = ContextMutator::new(&s.request.context_dir, &s.request.build_spec);
        tracing::info!(
            context = %s.request.context_dir.display(),
            max_attempts = max,
            "session started"
        );

        let mut attempt = 1u32;
        loop {
            if cancel.is_cancelled() {
                s.finish(SessionState::Cancelled, "cancelled");
                break;
            }

            s.machine.set_attempt(attempt);
            s.advance(SessionState::Attempting, None);
            progress.progress(attempt_percent(attempt, max));
            s.log.line(&format!(
                "attempt {}/{}: building {}",
                attempt, max, s.request.image_tag
            ));

            let build = BuildRequest {
                build_spec: s.request.build_spec.clone(),
                context_dir: s.request.context_dir.clone(),
                image_tag: s.request.image_tag.clone(),
                timeout: self.config.attempt_timeout,
            };
            let started_at = Utc::now();
            let clock = Instant::now();

            let outcome = match self.runner.run(&build, s.log, cancel).await {
                Ok(outcome) => outcome,
                Err(BuildRunnerError::Cancelled) => {
                    s.record_attempt(attempt, None, Vec::new(), started_at, clock.elapsed());
                    s.finish(SessionState::Cancelled, "cancelled");
                    break;
                }
                Err(e) => {
                    let error = BuildError::tool_failure(e.to_string());
                    s.log.line(&format!(
                        "classified as {} ({}): {}",
                        error.kind(),
                        error.severity(),
                        error.raw_message()
                    ));
                    s.record_attempt(attempt, None, vec![error], started_at, clock.elapsed());
                    tracing::warn!(error = %e, attempt, "build could not run");
                    s.finish(SessionState::Aborted, e.to_string());
                    break;
                }
            };

            if outcome.succeeded {
                s.record_attempt(attempt, Some(&outcome), Vec::new(), started_at, clock.elapsed());
                s.advance(SessionState::Success, None);
                s.result.succeeded = true;
                progress.progress(100);
                s.log.line(&format!("attempt {}: build succeeded", attempt));
                tracing::info!(attempt, "build succeeded");
                break;
            }

            s.advance(
                SessionState::Classifying,
                Some(&format!("exit code {:?}", outcome.exit_code)),
            );
            let errors = self.classifier.classify(&outcome.classification_text());
            for error in &errors {
                s.log.line(&format!(
                    "classified as {} ({}): {}",
                    error.kind(),
                    error.severity(),
                    error.raw_message()
                ));
                tracing::info!(
                    kind = %error.kind(),
                    severity = %error.severity(),
                    action = %error.suggested_action(),
                    path = error.missing_path().unwrap_or_default(),
                    "classified build error"
                );
            }
            s.record_attempt(
                attempt,
                Some(&outcome),
                errors.clone(),
                started_at,
                clock.elapsed(),
            );

            let inventory = ContextInventory::scan(&s.request.context_dir);
            let decision = match self.choose(&mut s, &errors, &inventory) {
                Ok(decision) => decision,
                Err(reason) => {
                    s.finish(SessionState::Unfixable, reason);
                    break;
                }
            };

            s.advance(SessionState::Remediating, None);
            let action = match decision {
                PlanDecision::Apply(action) => action,
                PlanDecision::Generate(target) => {
                    let generated = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        action = self.materialize(s.log, target, &inventory) => Some(action),
                    };
                    match generated {
                        Some(action) => action,
                        None => {
                            s.finish(SessionState::Cancelled, "cancelled");
                            break;
                        }
                    }
                }
                PlanDecision::Note(_) | PlanDecision::Unfixable(_) => {
                    s.finish(SessionState::Unfixable, "no viable remediation");
                    break;
                }
            };

            s.log.line(&format!("applying remediation: {}", action));
            tracing::info!(action = %action, attempt, "applying remediation");
            match mutator.apply(&action) {
                Ok(report) => {
                    for line in &report.descriptions {
                        s.log.line(&format!("  {}", line));
                    }
                    s.applied.insert(action.key());
                    s.result.generated_files.extend(report.generated_files);
                    s.result
                        .removed_instructions
                        .extend(report.removed_instructions);
                    s.result.remediations.push(AppliedRemediation {
                        attempt_number: attempt,
                        action: action.to_string(),
                        descriptions: report.descriptions,
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, action = %action, "remediation failed");
                    s.finish(SessionState::Aborted, format!("remediation failed: {}", e));
                    break;
                }
            }

            attempt += 1;
            if attempt > max {
                s.finish(
                    SessionState::Exhausted,
                    format!("attempt budget of {} exhausted", max),
                );
                break;
            }
            if let Some(limit) = self.config.session_timeout {
                if s.started.elapsed() >= limit {
                    s.finish(
                        SessionState::Exhausted,
                        format!("session timeout of {}s reached", limit.as_secs()),
                    );
                    break;
                }
            }
        }

        self.conclude(s)
    }

    /// First decision that changes the context and was not applied before.
    ///
    /// `Err` carries the reason nothing qualified.
    fn choose(
        &self,
        s: &mut Session<'_>,
        errors: &[BuildError],
        inventory: &ContextInventory,
    ) -> Result<PlanDecision, String> {
        let mut reasons = Vec::new();
        for error in errors {
            let decision = self.planner.plan(error, inventory);
            match &decision {
                PlanDecision::Note(note) => {
                    s.log.line(&format!("note: {}", note));
                    reasons.push(note.clone());
                }
                PlanDecision::Unfixable(reason) => {
                    s.log.line(&format!("no automatic fix: {}", reason));
                    reasons.push(reason.clone());
                }
                PlanDecision::Apply(_) | PlanDecision::Generate(_) => {
                    if let Some(key) = decision.action_key() {
                        if s.applied.contains(&key) {
                            let reason = format!("remediation `{}` already applied", key);
                            s.log.line(&format!("skipping: {}", reason));
                            tracing::info!(key = %key, "skipping repeated remediation");
                            reasons.push(reason);
                            continue;
                        }
                    }
                    return Ok(decision);
                }
            }
        }
        if reasons.is_empty() {
            Err("no viable remediation".to_string())
        } else {
            Err(format!("no viable remediation: {}", reasons.join("; ")))
        }
    }

    /// Turn a generation target into a write, falling back to a placeholder.
    async fn materialize(
        &self,
        log: &dyn LogSink,
        target: GenerationTarget,
        inventory: &ContextInventory,
    ) -> RemediationAction {
        let request = ContentRequest {
            path: normalize(&target.path).to_string(),
            file_type: target.file_type,
            project_context: inventory.project_context(),
        };
        let content = match self.generator.generate(&request).await {
            Ok(generated) if !generated.content.trim().is_empty() => generated.content,
            Ok(_) => {
                tracing::warn!(
                    generator = self.generator.name(),
                    path = %target.path,
                    "generator returned empty content, using placeholder"
                );
                log.line(&format!(
                    "content generator `{}` returned nothing for `{}`; using placeholder",
                    self.generator.name(),
                    target.path
                ));
                placeholder_for(&target.path)
            }
            Err(e) => {
                tracing::warn!(
                    generator = self.generator.name(),
                    path = %target.path,
                    error = %e,
                    "content generation failed, using placeholder"
                );
                log.line(&format!(
                    "content generator `{}` failed for `{}` ({}); using placeholder",
                    self.generator.name(),
                    target.path,
                    e
                ));
                placeholder_for(&target.path)
            }
        };
        RemediationAction::WriteFile {
            path: target.path,
            content,
            reason: target.reason,
        }
    }

    fn conclude(&self, s: Session<'_>) -> RemediationResult {
        let Session {
            request,
            log,
            machine,
            mut result,
            started,
            ..
        } = s;

        result.outcome = machine.current().outcome();
        result.succeeded = result.outcome == crate::types::SessionOutcome::Success;
        result.final_build_spec_text = std::fs::read_to_string(&request.build_spec).ok();
        result.duration_ms = started.elapsed().as_millis() as u64;

        tracing::debug!(path = %machine.path(), "session transitions");
        tracing::info!(
            outcome = %result.outcome,
            attempts = result.attempts.len(),
            duration_ms = result.duration_ms,
            "session finished"
        );
        log.line(&result.summary());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::OutputLine;
    use crate::sink::MemorySink;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fails with the given stderr until `fixed` returns true for the context.
    struct CheckingRunner {
        stderr: String,
        fixed: fn(&Path) -> bool,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl BuildRunner for CheckingRunner {
        async fn run(
            &self,
            request: &BuildRequest,
            sink: &dyn LogSink,
            _cancel: &CancellationToken,
        ) -> Result<BuildOutcome, BuildRunnerError> {
            *self.calls.lock().unwrap() += 1;
            if (self.fixed)(&request.context_dir) {
                sink.line("Successfully built");
                return Ok(BuildOutcome::from_lines(
                    Some(0),
                    vec![OutputLine::stdout("Successfully built")],
                ));
            }
            sink.line(&self.stderr);
            Ok(BuildOutcome::from_lines(
                Some(1),
                vec![OutputLine::stderr(self.stderr.clone())],
            ))
        }
    }

    fn context() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Dockerfile"),
            "FROM node:20\nWORKDIR /app\nCOPY . .\n",
        )
        .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_generated_file_fixes_build() {
        let dir = context();
        let runner = Arc::new(CheckingRunner {
            stderr: "\"/settings.json\": not found".to_string(),
            fixed: |ctx| ctx.join("settings.json").exists(),
            calls: Mutex::new(0),
        });
        let controller = RetryController::new(runner.clone(), SessionConfig::default());
        let sink = MemorySink::new();

        let result = controller
            .run(
                &SessionRequest::new(dir.path(), "demo"),
                &sink,
                &sink,
                &CancellationToken::new(),
            )
            .await;

        assert!(result.succeeded);
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(result.generated_files[0].path, "settings.json");
        assert_eq!(result.generated_files[0].content, "{}\n");
        assert_eq!(sink.progress_values(), vec![33, 66, 100]);
        assert!(sink
            .lines()
            .iter()
            .any(|l| l.starts_with("applying remediation: write file")));
    }

    #[tokio::test]
    async fn test_repeated_remediation_is_not_reapplied() {
        let dir = context();
        let runner = Arc::new(CheckingRunner {
            stderr: "\"/settings.json\": not found".to_string(),
            fixed: |_| false,
            calls: Mutex::new(0),
        });
        let controller = RetryController::new(
            runner.clone(),
            SessionConfig {
                max_attempts: 5,
                ..Default::default()
            },
        );

        let result = controller
            .run(
                &SessionRequest::new(dir.path(), "demo"),
                &MemorySink::new(),
                &MemorySink::new(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.outcome, crate::types::SessionOutcome::Unfixable);
        assert_eq!(*runner.calls.lock().unwrap(), 2);
        assert_eq!(result.remediations.len(), 1);
        assert!(result
            .terminal_reason
            .as_deref()
            .is_some_and(|r| r.contains("already applied")));
    }

    #[tokio::test]
    async fn test_session_timeout_ends_exhausted() {
        let dir = context();
        let runner = Arc::new(CheckingRunner {
            stderr: "invalid file request .dockerignore".to_string(),
            fixed: |_| false,
            calls: Mutex::new(0),
        });
        let controller = RetryController::new(
            runner.clone(),
            SessionConfig {
                max_attempts: 5,
                attempt_timeout: None,
                session_timeout: Some(Duration::ZERO),
            },
        );

        let result = controller
            .run(
                &SessionRequest::new(dir.path(), "demo"),
                &MemorySink::new(),
                &MemorySink::new(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.outcome, crate::types::SessionOutcome::Exhausted);
        assert_eq!(*runner.calls.lock().unwrap(), 1);
        assert!(result
            .terminal_reason
            .as_deref()
            .is_some_and(|r| r.starts_with("session timeout")));
    }

    #[test]
    fn test_request_defaults_to_dockerfile() {
        let request = SessionRequest::new("/ctx", "demo");
        assert_eq!(request.build_spec, PathBuf::from("/ctx/Dockerfile"));
        let request = request.with_build_spec("/ctx/build/Dockerfile.prod");
        assert_eq!(request.build_spec, PathBuf::from("/ctx/build/Dockerfile.prod"));
    }
}
