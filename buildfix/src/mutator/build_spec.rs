//! Line-level edits to a build-instruction file.
//!
//! The file is an ordered sequence of opaque lines. No grammar is parsed:
//! a line "references" a context path when it is a `COPY`/`ADD` reading from
//! the build context and one of its source operands names that path or
//! something underneath it. Destinations, `WORKDIR` and `RUN`/`CMD` operate
//! on the image filesystem and never match.

use crate::inventory::normalize;

/// Instruction inserted when no application copy remains.
pub const FALLBACK_COPY: &str = "COPY . .";

/// Result of filtering a build-instruction file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredSpec {
    pub text: String,
    pub removed: Vec<String>,
    pub fallback_inserted: bool,
}

fn instruction(line: &str) -> Option<String> {
    line.split_whitespace()
        .next()
        .map(|word| word.to_ascii_uppercase())
}

/// `COPY`/`ADD` that brings files from the build context (not `--from=`).
pub fn is_app_copy(line: &str) -> bool {
    match instruction(line).as_deref() {
        Some("COPY") | Some("ADD") => !line
            .split_whitespace()
            .any(|tok| tok.to_ascii_lowercase().starts_with("--from=")),
        _ => false,
    }
}

fn tokens(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| c.is_whitespace() || c == ',' || c == '[' || c == ']')
        .map(|tok| tok.trim_matches(|c| c == '"' || c == '\''))
        .filter(|tok| !tok.is_empty())
}

/// Source operands of a context copy: every operand except the destination.
fn copy_sources(line: &str) -> Vec<&str> {
    if !is_app_copy(line) {
        return Vec::new();
    }
    let mut operands: Vec<&str> = tokens(line)
        .skip(1)
        .filter(|tok| !tok.starts_with("--"))
        .collect();
    operands.pop();
    operands
}

/// Whether a context copy reads `path` (or a file under it).
pub fn references_path(line: &str, path: &str) -> bool {
    let target = normalize(path).trim_end_matches('/');
    if target.is_empty() || target == "." {
        return false;
    }
    copy_sources(line).into_iter().any(|src| {
        let src = normalize(src).trim_end_matches('/');
        src == target || src.starts_with(&format!("{}/", target))
    })
}

/// Remove every line referencing `path`; guarantee an application copy remains.
pub fn remove_referencing_lines(text: &str, path: &str) -> FilteredSpec {
    let mut removed = Vec::new();
    let mut kept: Vec<String> = Vec::new();
    for line in text.lines() {
        if references_path(line, path) {
            removed.push(line.to_string());
        } else {
            kept.push(line.to_string());
        }
    }

    let fallback_inserted = ensure_app_copy(&mut kept);

    let mut out = kept.join("\n");
    if text.ends_with('\n') || text.is_empty() {
        out.push('\n');
    }
    FilteredSpec {
        text: out,
        removed,
        fallback_inserted,
    }
}

/// Insert [`FALLBACK_COPY`] if no line copies application source.
///
/// Goes right after the last `WORKDIR`, else after the last `FROM`, else at
/// the end. Returns whether an insertion happened.
pub fn ensure_app_copy(lines: &mut Vec<String>) -> bool {
    if lines.iter().any(|l| is_app_copy(l)) {
        return false;
    }
    let position_of = |keyword: &str| {
        lines
            .iter()
            .rposition(|l| instruction(l).as_deref() == Some(keyword))
    };
    let at = position_of("WORKDIR")
        .or_else(|| position_of("FROM"))
        .map(|i| i + 1)
        .unwrap_or(lines.len());
    lines.insert(at, FALLBACK_COPY.to_string());
    true
}

/// Whether the text contains at least one application copy.
pub fn has_app_copy(text: &str) -> bool {
    text.lines().any(is_app_copy)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODE_SPEC: &str = "FROM node:20-alpine\nWORKDIR /app\nCOPY package.json .\nCOPY .npmrc .\nRUN npm install\nCOPY src/ ./src/\nCMD [\"node\", \"src/index.js\"]\n";

    #[test]
    fn test_references_path_tokens() {
        assert!(references_path("COPY .npmrc .", ".npmrc"));
        assert!(references_path("COPY ./static /app/static", "static/"));
        assert!(references_path("ADD [\"config/app.yaml\", \"/etc/app.yaml\"]", "config"));
        assert!(!references_path("RUN apt-get install -y curl", "app"));
        assert!(!references_path("# COPY .npmrc .", ".npmrc"));
        assert!(!references_path("COPY --chown=app:app . .", "app"));
        assert!(!references_path("COPY . .", "."));
        assert!(!references_path("WORKDIR /app", "app"));
        assert!(!references_path("COPY package.json /app/", "app"));
        assert!(!references_path("COPY --from=builder /app/dist ./dist", "dist"));
        assert!(!references_path("CMD [\"python\", \"-m\", \"app\"]", "app"));
        assert!(!references_path("COPY app", "app"));
    }

    #[test]
    fn test_is_app_copy() {
        assert!(is_app_copy("COPY . ."));
        assert!(is_app_copy("add src /app"));
        assert!(!is_app_copy("COPY --from=builder /out /app"));
        assert!(!is_app_copy("RUN cp a b"));
    }

    #[test]
    fn test_remove_keeps_other_copies() {
        let filtered = remove_referencing_lines(NODE_SPEC, ".npmrc");
        assert_eq!(filtered.removed, vec!["COPY .npmrc ."]);
        assert!(!filtered.fallback_inserted);
        assert!(!filtered.text.contains(".npmrc"));
        assert!(filtered.text.ends_with("CMD [\"node\", \"src/index.js\"]\n"));
    }

    #[test]
    fn test_removing_only_copy_inserts_fallback_after_workdir() {
        let spec = "FROM python:3.12\nWORKDIR /srv\nCOPY app/ /srv/app/\nCMD [\"python\", \"-m\", \"app\"]\n";
        let filtered = remove_referencing_lines(spec, "app/");
        assert!(filtered.fallback_inserted);
        let lines: Vec<&str> = filtered.text.lines().collect();
        assert_eq!(lines[1], "WORKDIR /srv");
        assert_eq!(lines[2], FALLBACK_COPY);
        assert_eq!(filtered.removed, vec!["COPY app/ /srv/app/"]);
        assert!(filtered.text.contains("CMD [\"python\", \"-m\", \"app\"]"));
        assert!(has_app_copy(&filtered.text));
    }

    #[test]
    fn test_image_paths_survive_context_dir_removal() {
        let spec = "FROM node:20\nWORKDIR /app\nCOPY app/ /app/\nCOPY package.json /app/\nCMD [\"node\", \"/app/index.js\"]\n";
        let filtered = remove_referencing_lines(spec, "/app");
        assert_eq!(filtered.removed, vec!["COPY app/ /app/"]);
        assert!(!filtered.fallback_inserted);
        assert_eq!(
            filtered.text,
            "FROM node:20\nWORKDIR /app\nCOPY package.json /app/\nCMD [\"node\", \"/app/index.js\"]\n"
        );
    }

    #[test]
    fn test_fallback_without_workdir_goes_after_last_from() {
        let spec = "FROM golang:1.22 AS build\nCOPY --from=deps /go /go\nFROM alpine\nCOPY bin/server /server\n";
        let filtered = remove_referencing_lines(spec, "bin/server");
        let lines: Vec<&str> = filtered.text.lines().collect();
        assert_eq!(lines, vec![
            "FROM golang:1.22 AS build",
            "COPY --from=deps /go /go",
            "FROM alpine",
            FALLBACK_COPY,
        ]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let once = remove_referencing_lines(NODE_SPEC, ".npmrc");
        let twice = remove_referencing_lines(&once.text, ".npmrc");
        assert_eq!(once.text, twice.text);
        assert!(twice.removed.is_empty());
    }

    #[test]
    fn test_empty_spec_gets_copy() {
        let filtered = remove_referencing_lines("", "x.txt");
        assert_eq!(filtered.text, "COPY . .\n");
    }
}
