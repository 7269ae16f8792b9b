//! Remediation planning
//!
//! A deterministic decision table from a classified [`BuildError`] (plus what
//! the build context contains) to a [`RemediationAction`], or an explicit
//! "unfixable" verdict.
//!
//! ```text
//! (kind, suggested_action)              → decision
//! (MissingFile, GenerateFile)           → policy: Generate | RemoveInstruction
//! (MissingFile, RemoveInstruction)      → RemoveInstruction
//! (MissingFile, Strip{Ignore,Config})   → ReplaceSupportFile(template)
//! (TagCase, _)                          → Note
//! (Unknown|Permission|Dependency|Syntax)→ Unfixable
//! ```

pub mod policy;

pub use policy::{DefaultVerdict, SynthesisPolicy, Verdict};

use crate::classifier::{file_name, IGNORE_FILES};
use crate::content::{support_file_template, FileType};
use crate::inventory::{normalize, ContextInventory};
use crate::types::{BuildError, ErrorKind, SuggestedAction};
use serde::{Deserialize, Serialize};

/// An executable change to the build context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemediationAction {
    /// Write `content` at `path`, creating parent directories
    WriteFile {
        path: String,
        content: String,
        reason: String,
    },
    /// Delete a support file, then write `replacement` in its place if given
    ReplaceSupportFile {
        path: String,
        replacement: Option<String>,
    },
    /// Drop every build-instruction line referencing `path`
    RemoveInstruction { path: String },
}

impl RemediationAction {
    /// Stable identity used to detect a remediation being repeated.
    pub fn key(&self) -> String {
        match self {
            Self::WriteFile { path, .. } => format!("write:{}", normalize(path)),
            Self::ReplaceSupportFile { path, .. } => format!("replace:{}", normalize(path)),
            Self::RemoveInstruction { path } => format!("remove:{}", normalize(path)),
        }
    }
}

impl std::fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WriteFile { path, .. } => write!(f, "write file `{}`", path),
            Self::ReplaceSupportFile {
                path,
                replacement: Some(_),
            } => write!(f, "replace `{}` with a minimal template", path),
            Self::ReplaceSupportFile {
                path,
                replacement: None,
            } => write!(f, "delete `{}`", path),
            Self::RemoveInstruction { path } => {
                write!(f, "remove build instructions referencing `{}`", path)
            }
        }
    }
}

/// A file the planner wants written but whose content still has to be generated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationTarget {
    pub path: String,
    pub file_type: FileType,
    pub reason: String,
}

/// Planner output for one error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanDecision {
    Apply(RemediationAction),
    Generate(GenerationTarget),
    /// Recorded for the user but does not change the context
    Note(String),
    Unfixable(String),
}

impl PlanDecision {
    /// Whether this decision changes the build context.
    pub fn is_viable(&self) -> bool {
        matches!(self, Self::Apply(_) | Self::Generate(_))
    }

    /// Key of the action this decision leads to, for repeat detection.
    pub fn action_key(&self) -> Option<String> {
        match self {
            Self::Apply(action) => Some(action.key()),
            Self::Generate(target) => Some(format!("write:{}", normalize(&target.path))),
            Self::Note(_) | Self::Unfixable(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RemediationPlanner {
    policy: SynthesisPolicy,
}

impl RemediationPlanner {
    pub fn new(policy: SynthesisPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SynthesisPolicy {
        &self.policy
    }

    pub fn plan(&self, error: &BuildError, inventory: &ContextInventory) -> PlanDecision {
        match error.kind() {
            ErrorKind::MissingFile => self.plan_missing(error, inventory),
            ErrorKind::TagCase => PlanDecision::Note(tag_case_note(error.raw_message())),
            ErrorKind::Unknown => {
                PlanDecision::Unfixable(format!("unrecognized failure: {}", error.raw_message()))
            }
            ErrorKind::Permission => PlanDecision::Unfixable(format!(
                "permission problem needs manual attention: {}",
                error.raw_message()
            )),
            ErrorKind::Dependency => PlanDecision::Unfixable(format!(
                "dependency or tooling failure: {}",
                error.raw_message()
            )),
            ErrorKind::Syntax => PlanDecision::Unfixable(format!(
                "build file syntax error: {}",
                error.raw_message()
            )),
        }
    }

    fn plan_missing(&self, error: &BuildError, inventory: &ContextInventory) -> PlanDecision {
        let Some(path) = error.missing_path() else {
            return PlanDecision::Unfixable("missing-file error without a path".to_string());
        };

        match error.suggested_action() {
            SuggestedAction::StripIgnoreFile | SuggestedAction::StripConfigFile => {
                PlanDecision::Apply(RemediationAction::ReplaceSupportFile {
                    path: path.to_string(),
                    replacement: support_file_template(file_name(path)).map(String::from),
                })
            }
            SuggestedAction::RemoveInstruction => {
                PlanDecision::Apply(RemediationAction::RemoveInstruction {
                    path: path.to_string(),
                })
            }
            SuggestedAction::GenerateFile => {
                // Present on disk yet missing to the build: the ignore file excludes it.
                // Anything else hiding it is not ours to guess at, and the file must not
                // be overwritten.
                if inventory.contains(path) {
                    return match IGNORE_FILES.iter().find(|f| inventory.contains(f)) {
                        Some(ignore) => PlanDecision::Apply(RemediationAction::ReplaceSupportFile {
                            path: ignore.to_string(),
                            replacement: support_file_template(ignore).map(String::from),
                        }),
                        None => PlanDecision::Unfixable(format!(
                            "`{}` exists in the context but the build cannot see it",
                            path
                        )),
                    };
                }
                match self.policy.verdict(path) {
                    Verdict::Synthesize(file_type) => PlanDecision::Generate(GenerationTarget {
                        path: path.to_string(),
                        file_type,
                        reason: format!("build referenced missing {} file", file_type),
                    }),
                    Verdict::Excise(why) => {
                        tracing::debug!(path, reason = %why, "excising instead of generating");
                        PlanDecision::Apply(RemediationAction::RemoveInstruction {
                            path: path.to_string(),
                        })
                    }
                }
            }
            SuggestedAction::FixTagCase | SuggestedAction::ManualFix => PlanDecision::Unfixable(
                format!("no automatic fix for missing `{}`", path),
            ),
        }
    }
}

fn tag_case_note(raw: &str) -> String {
    // Docker quotes the offending reference: invalid argument "MyApp:latest" for "-t, --tag"
    let quoted = raw.split('"').nth(1).filter(|t| !t.is_empty() && !t.contains(' '));
    match quoted {
        Some(tag) => format!(
            "image tag must be lowercase; rebuild with `{}`",
            lowercase_tag(tag)
        ),
        None => format!(
            "image tag must be lowercase; derive the tag in lowercase and rebuild ({})",
            raw
        ),
    }
}

/// Lowercased form of an image reference, for callers deriving tags.
pub fn lowercase_tag(tag: &str) -> String {
    tag.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ErrorClassifier;
    use crate::types::Severity;

    fn empty_inventory() -> ContextInventory {
        ContextInventory::from_paths("/ctx", Vec::<String>::new())
    }

    #[test]
    fn test_dockerignore_gets_template() {
        let error = ErrorClassifier::new().classify("invalid file request .dockerignore").remove(0);
        match RemediationPlanner::default().plan(&error, &empty_inventory()) {
            PlanDecision::Apply(RemediationAction::ReplaceSupportFile { path, replacement }) => {
                assert_eq!(path, ".dockerignore");
                assert!(replacement.is_some_and(|r| !r.is_empty()));
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn test_config_file_is_generated() {
        let error = ErrorClassifier::new().classify("\"app/config.yaml\": not found").remove(0);
        let decision = RemediationPlanner::default().plan(&error, &empty_inventory());
        assert_eq!(
            decision,
            PlanDecision::Generate(GenerationTarget {
                path: "app/config.yaml".to_string(),
                file_type: FileType::Config,
                reason: "build referenced missing config file".to_string(),
            })
        );
        assert!(decision.is_viable());
    }

    #[test]
    fn test_artifact_overrides_generate_suggestion() {
        let error = BuildError::missing_file(
            "dist/app.log",
            "\"dist/app.log\": not found",
            Severity::High,
            SuggestedAction::GenerateFile,
        );
        assert_eq!(
            RemediationPlanner::default().plan(&error, &empty_inventory()),
            PlanDecision::Apply(RemediationAction::RemoveInstruction {
                path: "dist/app.log".to_string()
            })
        );
    }

    #[test]
    fn test_file_hidden_by_ignore_file() {
        let inventory = ContextInventory::from_paths("/ctx", ["app/config.yaml", ".dockerignore"]);
        let error = ErrorClassifier::new().classify("\"/app/config.yaml\": not found").remove(0);
        match RemediationPlanner::default().plan(&error, &inventory) {
            PlanDecision::Apply(RemediationAction::ReplaceSupportFile { path, .. }) => {
                assert_eq!(path, ".dockerignore")
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn test_existing_file_without_ignore_file_is_unfixable() {
        let inventory =
            ContextInventory::from_paths("/ctx", ["app/config.yaml", "Dockerfile.dockerignore"]);
        let error = ErrorClassifier::new().classify("\"/app/config.yaml\": not found").remove(0);
        assert_eq!(
            RemediationPlanner::default().plan(&error, &inventory),
            PlanDecision::Unfixable(
                "`/app/config.yaml` exists in the context but the build cannot see it".to_string()
            )
        );
    }

    #[test]
    fn test_tag_case_is_note_only() {
        let error = ErrorClassifier::new()
            .classify("invalid reference format: repository name must be lowercase")
            .remove(0);
        let decision = RemediationPlanner::default().plan(&error, &empty_inventory());
        assert!(matches!(decision, PlanDecision::Note(_)));
        assert!(!decision.is_viable());
        assert_eq!(lowercase_tag("MyApp:Latest"), "myapp:latest");

        let error = ErrorClassifier::new()
            .classify("invalid argument \"MyApp:latest\" for \"-t, --tag\" flag: invalid reference format: repository name must be lowercase")
            .remove(0);
        assert_eq!(
            RemediationPlanner::default().plan(&error, &empty_inventory()),
            PlanDecision::Note("image tag must be lowercase; rebuild with `myapp:latest`".to_string())
        );
    }

    #[test]
    fn test_unfixable_kinds() {
        let planner = RemediationPlanner::default();
        for text in [
            "something unexpected",
            "open /root/.docker/config.json: permission denied",
            "npm ERR! code ERESOLVE",
            "dockerfile parse error line 3: unknown instruction: RUNN",
        ] {
            let error = ErrorClassifier::new().classify(text).remove(0);
            assert!(
                matches!(planner.plan(&error, &empty_inventory()), PlanDecision::Unfixable(_)),
                "{text}"
            );
        }
    }

    #[test]
    fn test_action_keys_normalize_paths() {
        let a = RemediationAction::RemoveInstruction {
            path: "/static/".to_string(),
        };
        let b = RemediationAction::RemoveInstruction {
            path: "static/".to_string(),
        };
        assert_eq!(a.key(), b.key());
        assert_eq!(a.to_string(), "remove build instructions referencing `/static/`");
    }
}
