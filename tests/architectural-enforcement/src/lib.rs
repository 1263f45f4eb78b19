//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that scan the workspace sources
//! and enforce the rules the dispatch path depends on:
//! - No thread-blocking calls inside async code
//! - No `unwrap()` / `expect()` in production code
//!
//! The helpers here walk production sources, skipping test modules.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["prom/core/src", "prom/cli/src"];

/// Files that only exist for tests
const TEST_ONLY_FILES: &[&str] = &["test_utils.rs"];

/// A forbidden pattern found in production code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the match
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The offending line, trimmed
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.path.display(), self.line, self.text)
    }
}

/// Workspace root, derived from this crate's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .unwrap_or_else(|_| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../.."))
}

/// Every production `.rs` file under [`PRODUCTION_DIRS`]
#[must_use]
pub fn production_files() -> Vec<PathBuf> {
    let root = workspace_root();
    PRODUCTION_DIRS
        .iter()
        .flat_map(|dir| WalkDir::new(root.join(dir)).into_iter().filter_map(Result::ok))
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| path.extension().is_some_and(|ext| ext == "rs"))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map_or(true, |name| !TEST_ONLY_FILES.contains(&name))
        })
        .collect()
}

/// Production lines of a source file
///
/// Everything before the `#[cfg(test)] mod tests` block, minus line and doc
/// comments and minus single items gated on `#[cfg(test)]` elsewhere.
#[must_use]
pub fn production_lines(source: &str) -> Vec<(usize, &str)> {
    let mut lines = Vec::new();
    let mut iter = source.lines().enumerate().peekable();

    while let Some((idx, line)) = iter.next() {
        let trimmed = line.trim();
        if trimmed == "#[cfg(test)]" {
            let next = iter.peek().map_or("", |(_, next)| next.trim());
            if next.starts_with("mod tests") {
                break;
            }
            // Test-only item such as `mod test_utils;`
            iter.next();
            continue;
        }
        if !trimmed.starts_with("//") {
            lines.push((idx + 1, line));
        }
    }

    lines
}

/// Scan production code for any of `patterns`
///
/// # Panics
///
/// Panics if a production file cannot be read.
#[must_use]
pub fn find_violations(patterns: &[&str]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for path in production_files() {
        let source = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()));
        for (line, text) in production_lines(&source) {
            if patterns.iter().any(|pattern| text.contains(pattern)) {
                violations.push(Violation {
                    path: path.clone(),
                    line,
                    text: text.trim().to_string(),
                });
            }
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let source = "fn a() {}\n// x.unwrap()\nfn b() {}\n#[cfg(test)]\nmod tests {}\n";
        let lines = production_lines(source);
        assert_eq!(lines, vec![(1, "fn a() {}"), (3, "fn b() {}")]);
    }

    #[test]
    fn test_gated_item_does_not_end_the_scan() {
        let source = "mod a;\n#[cfg(test)]\nmod test_utils;\npub use a::x;\nlet y = z.unwrap();\n";
        let lines = production_lines(source);
        assert_eq!(
            lines,
            vec![(1, "mod a;"), (4, "pub use a::x;"), (5, "let y = z.unwrap();")]
        );
    }

    #[test]
    fn test_production_files_found() {
        let files = production_files();
        assert!(files.iter().any(|p| p.ends_with("dispatcher.rs")));
        assert!(files.iter().any(|p| p.ends_with("main.rs")));
        assert!(!files.iter().any(|p| p.ends_with("test_utils.rs")));
    }
}
