//! buildfix: automatic remediation for failed container image builds
//!
//! Runs a build, classifies the failure output, applies a targeted fix to the
//! build context, and rebuilds, up to a bounded number of attempts.
//!
//! # Components
//!
//! - [`executor`]: runs one build attempt and streams its output
//! - [`classifier`]: build output → ordered [`BuildError`] records
//! - [`planner`]: error + context inventory → [`RemediationAction`]
//! - [`mutator`]: applies actions to the build context (atomic, idempotent)
//! - [`session`]: the retry state machine tying the above together
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use buildfix::{DockerExecutor, NullSink, RetryController, SessionConfig, SessionRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() {
//! let runner = Arc::new(DockerExecutor::new("docker").with_build_args(["--progress=plain"]));
//! let controller = RetryController::new(runner, SessionConfig::default());
//! let request = SessionRequest::new("./app", "myapp:latest");
//! let result = controller
//!     .run(&request, &|line: &str| println!("{line}"), &NullSink, &CancellationToken::new())
//!     .await;
//! println!("{}", result.summary());
//! # }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod classifier;
pub mod config;
pub mod content;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod mutator;
pub mod planner;
pub mod session;
pub mod sink;
pub mod types;

pub use classifier::{ErrorClassifier, PatternRule};
pub use config::EngineConfig;
pub use content::{
    ContentGenerator, ContentRequest, FileType, GeneratedContent, GeneratorError,
    PlaceholderGenerator,
};
pub use error::{EngineError, EngineResult};
pub use executor::{
    BuildOutcome, BuildRequest, BuildRunner, BuildRunnerError, DockerExecutor, OutputLine, Stream,
};
pub use inventory::ContextInventory;
pub use mutator::{ContextMutator, MutationReport};
pub use planner::{
    GenerationTarget, PlanDecision, RemediationAction, RemediationPlanner, SynthesisPolicy,
};
pub use session::{RetryController, SessionConfig, SessionRequest, SessionState};
pub use sink::{LogSink, MemorySink, NullSink, ProgressSink};
pub use types::{
    AppliedRemediation, AttemptRecord, BuildError, ErrorKind, GeneratedFile, RemediationResult,
    SessionOutcome, Severity, SuggestedAction,
};
