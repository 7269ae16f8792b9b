//! Synthesis policy: which missing paths are worth generating and which
//! should be cut out of the build instead.
//!
//! Excise entries are checked before synthesize entries. Everything is plain
//! data so deployments can tune the table from the `[policy]` section of the
//! engine config.

use crate::classifier::file_name;
use crate::content::{extension, FileType};
use crate::inventory::normalize;
use serde::{Deserialize, Serialize};

/// Planner verdict for a missing path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Synthesize(FileType),
    Excise(String),
}

/// What to do with paths the table does not mention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultVerdict {
    Synthesize,
    Excise,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisPolicy {
    /// Path segments marking build output, caches, VCS and IDE state
    pub excise_dirs: Vec<String>,
    /// Extensions of logs, temp files and compiled artifacts
    pub excise_extensions: Vec<String>,
    /// OS metadata and similar junk
    pub excise_files: Vec<String>,
    pub config_extensions: Vec<String>,
    pub docs_extensions: Vec<String>,
    pub source_extensions: Vec<String>,
    /// Lint/format rule files, matched by file name
    pub rule_files: Vec<String>,
    /// Extension-less file names that are fine to synthesize
    pub synthesize_files: Vec<String>,
    /// Verdict for paths with an unlisted extension
    pub default_verdict: DefaultVerdict,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for SynthesisPolicy {
    fn default() -> Self {
        Self {
            excise_dirs: strings(&[
                "build",
                "dist",
                "out",
                "target",
                "node_modules",
                ".next",
                ".nuxt",
                ".cache",
                "__pycache__",
                ".pytest_cache",
                "coverage",
                ".git",
                ".svn",
                ".hg",
                ".idea",
                ".vscode",
                "tmp",
            ]),
            excise_extensions: strings(&[
                "log", "tmp", "temp", "swp", "swo", "bak", "pyc", "pyo", "class", "o", "obj",
                "pid", "lock",
            ]),
            excise_files: strings(&[".DS_Store", "Thumbs.db", "desktop.ini"]),
            config_extensions: strings(&[
                "json",
                "yaml",
                "yml",
                "toml",
                "ini",
                "cfg",
                "conf",
                "env",
                "properties",
                "xml",
            ]),
            docs_extensions: strings(&["md", "txt", "rst", "adoc"]),
            source_extensions: strings(&[
                "js", "cjs", "mjs", "ts", "tsx", "jsx", "py", "rb", "go", "rs", "java", "php",
                "sh", "css", "scss", "html", "sql",
            ]),
            rule_files: strings(&[
                ".eslintrc",
                ".eslintrc.json",
                ".eslintrc.js",
                ".prettierrc",
                ".prettierrc.json",
                ".editorconfig",
                ".babelrc",
                ".stylelintrc",
                ".flake8",
            ]),
            synthesize_files: strings(&[
                "Makefile",
                "Procfile",
                "LICENSE",
                "README",
                ".env",
                ".env.example",
            ]),
            default_verdict: DefaultVerdict::Synthesize,
        }
    }
}

impl SynthesisPolicy {
    /// Decide whether a missing path should be generated or excised.
    pub fn verdict(&self, path: &str) -> Verdict {
        let rel = normalize(path);
        let name = file_name(rel);
        let ext = extension(rel);

        // Directory segments of the path, or the whole path when it names a directory.
        let is_dir = rel.ends_with('/');
        let dir_segments: Vec<&str> = {
            let trimmed = rel.trim_end_matches('/');
            let mut segments: Vec<&str> = trimmed.split('/').collect();
            if !is_dir {
                segments.pop();
            }
            segments
        };
        if let Some(seg) = dir_segments
            .iter()
            .find(|seg| self.excise_dirs.iter().any(|d| d == *seg))
        {
            return Verdict::Excise(format!("`{}` is build or tool state", seg));
        }
        if self.excise_files.iter().any(|f| f == name) {
            return Verdict::Excise(format!("`{}` is OS metadata", name));
        }
        if let Some(ext) = ext.as_deref() {
            if self.excise_extensions.iter().any(|e| e == ext) {
                return Verdict::Excise(format!("`.{}` files are generated artifacts", ext));
            }
        }
        if is_dir {
            return Verdict::Excise("missing directory cannot be synthesized".to_string());
        }

        if self.rule_files.iter().any(|f| f == name) {
            return Verdict::Synthesize(FileType::Rules);
        }
        if self.synthesize_files.iter().any(|f| f == name) {
            return Verdict::Synthesize(if name.starts_with(".env") {
                FileType::Config
            } else {
                FileType::Other
            });
        }
        match ext.as_deref() {
            Some(ext) if self.config_extensions.iter().any(|e| e == ext) => {
                Verdict::Synthesize(FileType::Config)
            }
            Some(ext) if self.docs_extensions.iter().any(|e| e == ext) => {
                Verdict::Synthesize(FileType::Docs)
            }
            Some(ext) if self.source_extensions.iter().any(|e| e == ext) => {
                Verdict::Synthesize(FileType::Source)
            }
            Some(_) => match self.default_verdict {
                DefaultVerdict::Synthesize => Verdict::Synthesize(FileType::Other),
                DefaultVerdict::Excise => {
                    Verdict::Excise("extension not in the synthesis table".to_string())
                }
            },
            None => Verdict::Excise("extension-less path is not a known file".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_docs_source_are_synthesized() {
        let policy = SynthesisPolicy::default();
        assert_eq!(
            policy.verdict("app/config.yaml"),
            Verdict::Synthesize(FileType::Config)
        );
        assert_eq!(policy.verdict("/docs/guide.md"), Verdict::Synthesize(FileType::Docs));
        assert_eq!(policy.verdict("src/index.ts"), Verdict::Synthesize(FileType::Source));
        assert_eq!(policy.verdict(".eslintrc.json"), Verdict::Synthesize(FileType::Rules));
        assert_eq!(policy.verdict("Procfile"), Verdict::Synthesize(FileType::Other));
    }

    #[test]
    fn test_artifacts_are_excised() {
        let policy = SynthesisPolicy::default();
        assert!(matches!(policy.verdict("dist/bundle.js"), Verdict::Excise(_)));
        assert!(matches!(policy.verdict(".vscode/settings.json"), Verdict::Excise(_)));
        assert!(matches!(policy.verdict("logs/app.log"), Verdict::Excise(_)));
        assert!(matches!(policy.verdict(".DS_Store"), Verdict::Excise(_)));
        assert!(matches!(policy.verdict("static/"), Verdict::Excise(_)));
        assert!(matches!(policy.verdict("bin"), Verdict::Excise(_)));
    }

    #[test]
    fn test_file_named_like_excise_dir_is_not_excised() {
        let policy = SynthesisPolicy::default();
        assert_eq!(policy.verdict("scripts/build.sh"), Verdict::Synthesize(FileType::Source));
    }

    #[test]
    fn test_default_verdict_is_configurable() {
        let policy = SynthesisPolicy {
            default_verdict: DefaultVerdict::Excise,
            ..Default::default()
        };
        assert!(matches!(policy.verdict("model.onnx"), Verdict::Excise(_)));
        assert_eq!(
            SynthesisPolicy::default().verdict("model.onnx"),
            Verdict::Synthesize(FileType::Other)
        );
    }

    #[test]
    fn test_policy_from_partial_toml() {
        let policy: SynthesisPolicy = toml::from_str(
            r#"
            excise_dirs = ["vendor"]
            default_verdict = "excise"
            "#,
        )
        .unwrap();
        assert!(matches!(policy.verdict("vendor/lib.go"), Verdict::Excise(_)));
        assert!(matches!(policy.verdict("dist/app.js"), Verdict::Synthesize(_)));
        assert_eq!(policy.default_verdict, DefaultVerdict::Excise);
    }
}
