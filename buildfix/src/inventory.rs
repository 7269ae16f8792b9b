//! Build-context inventory: the files a context actually holds.

use ignore::WalkBuilder;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Manifest files that identify a project's stack.
const STACK_MARKERS: &[(&str, &str)] = &[
    ("package.json", "node"),
    ("requirements.txt", "python"),
    ("pyproject.toml", "python"),
    ("go.mod", "go"),
    ("Cargo.toml", "rust"),
    ("Gemfile", "ruby"),
    ("pom.xml", "java"),
    ("composer.json", "php"),
];

/// Directories never worth listing.
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "target", "__pycache__"];

/// How many paths `project_context` lists.
const CONTEXT_LISTING_LIMIT: usize = 40;

/// Snapshot of the relative file paths inside a build context.
#[derive(Debug, Clone, Default)]
pub struct ContextInventory {
    root: PathBuf,
    files: BTreeSet<String>,
}

impl ContextInventory {
    /// Walk the context directory. Hidden files are included and no ignore
    /// rules are applied, since the build tool sees them too.
    pub fn scan(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let mut files = BTreeSet::new();
        let walker = WalkBuilder::new(&root)
            .standard_filters(false)
            .hidden(false)
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                entry.depth() == 0
                    || !(entry.file_type().is_some_and(|t| t.is_dir())
                        && SKIP_DIRS.contains(&name.as_ref()))
            })
            .build();

        for entry in walker.flatten() {
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&root) {
                files.insert(rel.to_string_lossy().replace('\\', "/"));
            }
        }

        Self { root, files }
    }

    /// Inventory from an explicit file list.
    pub fn from_paths<I, S>(root: impl AsRef<Path>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root: root.as_ref().to_path_buf(),
            files: paths
                .into_iter()
                .map(|p| normalize(&p.into()).to_string())
                .collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Whether the context holds `path` (leading `/` or `./` ignored).
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains(normalize(path))
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }

    /// Detected stacks, e.g. `["node"]`.
    pub fn stacks(&self) -> Vec<&'static str> {
        let mut stacks: Vec<&'static str> = STACK_MARKERS
            .iter()
            .filter(|(marker, _)| self.files.contains(*marker))
            .map(|(_, stack)| *stack)
            .collect();
        stacks.dedup();
        stacks
    }

    /// Text summary passed to the content generator.
    pub fn project_context(&self) -> String {
        let stacks = self.stacks();
        let mut out = if stacks.is_empty() {
            "Stack: unknown\n".to_string()
        } else {
            format!("Stack: {}\n", stacks.join(", "))
        };
        out.push_str(&format!("Files ({} total):\n", self.files.len()));
        for file in self.files.iter().take(CONTEXT_LISTING_LIMIT) {
            out.push_str("- ");
            out.push_str(file);
            out.push('\n');
        }
        if self.files.len() > CONTEXT_LISTING_LIMIT {
            out.push_str(&format!(
                "- ... {} more\n",
                self.files.len() - CONTEXT_LISTING_LIMIT
            ));
        }
        out
    }
}

/// Strip `./` and leading `/` so build-tool paths compare with context paths.
pub fn normalize(path: &str) -> &str {
    let mut p = path.trim();
    loop {
        if let Some(rest) = p.strip_prefix("./") {
            p = rest;
        } else if let Some(rest) = p.strip_prefix('/') {
            p = rest;
        } else {
            return p;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_scan_includes_hidden_and_skips_vcs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("app")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        fs::write(dir.path().join(".dockerignore"), "node_modules").unwrap();
        fs::write(dir.path().join("app/index.js"), "").unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();

        let inventory = ContextInventory::scan(dir.path());
        assert_eq!(inventory.len(), 3);
        assert!(inventory.contains(".dockerignore"));
        assert!(inventory.contains("/app/index.js"));
        assert!(!inventory.contains(".git/HEAD"));
        assert_eq!(inventory.stacks(), vec!["node"]);
    }

    #[test]
    fn test_project_context_lists_files() {
        let inventory = ContextInventory::from_paths("/ctx", ["requirements.txt", "./main.py"]);
        let ctx = inventory.project_context();
        assert!(ctx.starts_with("Stack: python"));
        assert!(ctx.contains("- main.py"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("./app/x"), "app/x");
        assert_eq!(normalize("/app/x"), "app/x");
        assert_eq!(normalize(".dockerignore"), ".dockerignore");
    }
}
