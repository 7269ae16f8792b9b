//! Context mutation. This is the only code that writes into a build context.
//!
//! Every operation is idempotent (deleting an absent file succeeds, removing
//! already-removed lines changes nothing) and every write goes through a
//! temp file + rename so a crash never leaves a partial file behind.

pub mod build_spec;

use crate::error::{EngineError, EngineResult};
use crate::inventory::normalize;
use crate::planner::RemediationAction;
use crate::types::GeneratedFile;
use std::path::{Component, Path, PathBuf};

/// What a single `apply` changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationReport {
    /// Human-readable audit lines
    pub descriptions: Vec<String>,
    pub generated_files: Vec<GeneratedFile>,
    pub removed_instructions: Vec<String>,
}

pub struct ContextMutator {
    context_dir: PathBuf,
    build_spec: PathBuf,
}

impl ContextMutator {
    pub fn new(context_dir: impl AsRef<Path>, build_spec: impl AsRef<Path>) -> Self {
        Self {
            context_dir: context_dir.as_ref().to_path_buf(),
            build_spec: build_spec.as_ref().to_path_buf(),
        }
    }

    pub fn context_dir(&self) -> &Path {
        &self.context_dir
    }

    pub fn build_spec(&self) -> &Path {
        &self.build_spec
    }

    /// Apply one remediation action.
    pub fn apply(&self, action: &RemediationAction) -> EngineResult<MutationReport> {
        match action {
            RemediationAction::WriteFile {
                path,
                content,
                reason,
            } => self.write_file(path, content, reason),
            RemediationAction::ReplaceSupportFile { path, replacement } => {
                self.replace_support_file(path, replacement.as_deref())
            }
            RemediationAction::RemoveInstruction { path } => self.remove_instruction(path),
        }
    }

    fn write_file(&self, path: &str, content: &str, reason: &str) -> EngineResult<MutationReport> {
        let target = self.resolve(path)?;
        match std::fs::read(&target) {
            Ok(existing) if existing == content.as_bytes() => {
                return Ok(MutationReport {
                    descriptions: vec![format!("`{}` already has the generated content", path)],
                    ..MutationReport::default()
                });
            }
            Ok(_) => {
                return Err(EngineError::WouldOverwrite {
                    path: path.to_string(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(EngineError::io(&target, e)),
        }
        write_atomic(&target, content)?;
        tracing::info!(path, bytes = content.len(), "wrote file into build context");
        Ok(MutationReport {
            descriptions: vec![format!("wrote `{}` ({} bytes): {}", path, content.len(), reason)],
            generated_files: vec![GeneratedFile {
                path: normalize(path).to_string(),
                content: content.to_string(),
                reason: reason.to_string(),
            }],
            removed_instructions: Vec::new(),
        })
    }

    fn replace_support_file(
        &self,
        path: &str,
        replacement: Option<&str>,
    ) -> EngineResult<MutationReport> {
        let target = self.resolve(path)?;
        let mut report = MutationReport::default();

        match std::fs::remove_file(&target) {
            Ok(()) => report.descriptions.push(format!("deleted `{}`", path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => report
                .descriptions
                .push(format!("`{}` already absent", path)),
            Err(e) => return Err(EngineError::io(&target, e)),
        }

        if let Some(content) = replacement {
            write_atomic(&target, content)?;
            report
                .descriptions
                .push(format!("replaced `{}` with a minimal template", path));
            report.generated_files.push(GeneratedFile {
                path: normalize(path).to_string(),
                content: content.to_string(),
                reason: "minimal replacement for a support file".to_string(),
            });
        }
        tracing::info!(path, replaced = replacement.is_some(), "normalized support file");
        Ok(report)
    }

    fn remove_instruction(&self, path: &str) -> EngineResult<MutationReport> {
        let text = std::fs::read_to_string(&self.build_spec)
            .map_err(|e| EngineError::io(&self.build_spec, e))?;
        let filtered = build_spec::remove_referencing_lines(&text, path);

        let mut report = MutationReport::default();
        if filtered.text != text {
            write_atomic(&self.build_spec, &filtered.text)?;
        }
        for line in &filtered.removed {
            report.descriptions.push(format!("removed instruction `{}`", line));
        }
        if filtered.fallback_inserted {
            report.descriptions.push(format!(
                "inserted `{}` so application source is still copied",
                build_spec::FALLBACK_COPY
            ));
        }
        if report.descriptions.is_empty() {
            report
                .descriptions
                .push(format!("no instruction references `{}`", path));
        }
        tracing::info!(
            path,
            removed = filtered.removed.len(),
            fallback = filtered.fallback_inserted,
            "filtered build instructions"
        );
        report.removed_instructions = filtered.removed;
        Ok(report)
    }

    /// Resolve a build-tool path against the context root, refusing escapes.
    pub fn resolve(&self, path: &str) -> EngineResult<PathBuf> {
        let rel = Path::new(normalize(path));
        let escapes = rel.as_os_str().is_empty()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(EngineError::PathEscapesContext {
                path: path.to_string(),
            });
        }
        Ok(self.context_dir.join(rel))
    }
}

/// Write `content` to `target` via a sibling temp file and rename.
pub fn write_atomic(target: &Path, content: &str) -> EngineResult<()> {
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

    if let Err(e) = std::fs::write(&tmp, content) {
        let _ = std::fs::remove_file(&tmp);
        return Err(EngineError::io(&tmp, e));
    }
    if let Err(e) = std::fs::rename(&tmp, target) {
        let _ = std::fs::remove_file(&tmp);
        return Err(EngineError::io(target, e));
    }
    Ok(())
}
