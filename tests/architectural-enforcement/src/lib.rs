//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles
//! on the production sources of the workspace:
//! - No sleep() calls in production code
//! - No blocking I/O inside async functions
//! - No unwrap()/expect() outside tests
//!
//! The helpers here do plain line scanning.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source trees checked by every rule, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["conductor/core/src", "conductor/chat/src"];

/// A production source file, with its test module cut off
pub struct SourceFile {
    /// Path of the file
    pub path: PathBuf,
    /// Lines up to (not including) the first `#[cfg(test)]`
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Format a violation at `idx` (0-based)
    #[must_use]
    pub fn violation(&self, idx: usize, what: &str) -> String {
        format!(
            "{}:{} - {}: {}",
            self.path.display(),
            idx + 1,
            what,
            self.lines[idx].trim()
        )
    }
}

/// Workspace root, independent of the directory the tests run from
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// All `.rs` files under [`PRODUCTION_DIRS`], test modules removed
#[must_use]
pub fn production_sources() -> Vec<SourceFile> {
    let root = workspace_root();
    let mut files = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let Ok(content) = fs::read_to_string(entry.path()) else {
                continue;
            };
            files.push(SourceFile {
                path: entry.path().to_path_buf(),
                lines: production_lines(&content),
            });
        }
    }

    files
}

/// Lines before the first `#[cfg(test)]` marker
#[must_use]
pub fn production_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .take_while(|line| !line.trim_start().starts_with("#[cfg(test)]"))
        .map(str::to_string)
        .collect()
}

/// Code part of a line, without `//` comments or block comment continuations
#[must_use]
pub fn code_part(line: &str) -> &str {
    let line = line.split("//").next().unwrap_or(line);
    if line.trim_start().starts_with('*') {
        ""
    } else {
        line
    }
}

/// If `line` opens a function, whether that function is async
#[must_use]
pub fn fn_signature(line: &str) -> Option<bool> {
    let mut rest = line.trim();
    for prefix in ["pub(crate) ", "pub(super) ", "pub "] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
            break;
        }
    }
    let is_async = rest.starts_with("async ");
    if is_async {
        rest = &rest["async ".len()..];
    }
    rest.starts_with("fn ").then_some(is_async)
}

/// Whether the line at `idx` sits in an async function
#[must_use]
pub fn is_in_async_function<S: AsRef<str>>(lines: &[S], idx: usize) -> bool {
    for i in (0..=idx).rev() {
        let line = lines[i].as_ref().trim();
        if let Some(is_async) = fn_signature(line) {
            return is_async;
        }
        if line.starts_with("mod ") || (line.starts_with("impl") && line.ends_with('{')) {
            return false;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_signature() {
        assert_eq!(fn_signature("fn main() {"), Some(false));
        assert_eq!(fn_signature("    pub async fn run(&mut self) {"), Some(true));
        assert_eq!(fn_signature("pub(crate) fn helper() -> u8 {"), Some(false));
        assert_eq!(fn_signature("let f = 1;"), None);
    }

    #[test]
    fn test_async_detection() {
        let code = [
            "pub async fn bad() {",
            "    let contents = std::fs::read_to_string(\"file.txt\")?;",
            "}",
            "pub fn fine() {",
            "    let contents = std::fs::read_to_string(\"config.toml\")?;",
            "}",
        ];
        assert!(is_in_async_function(&code, 1));
        assert!(!is_in_async_function(&code, 4));
    }

    #[test]
    fn test_production_lines_stop_at_tests() {
        let content = "fn a() {}\n#[cfg(test)]\nmod tests {\n    fn b() { x.unwrap(); }\n}\n";
        assert_eq!(production_lines(content), vec!["fn a() {}".to_string()]);
    }

    #[test]
    fn test_code_part_strips_comments() {
        assert_eq!(code_part("let x = y; // y.unwrap()"), "let x = y; ");
        assert_eq!(code_part("    /// doc"), "    ");
        assert_eq!(code_part("   * block comment .unwrap()"), "");
    }

    #[test]
    fn test_workspace_root_has_core() {
        assert!(workspace_root().join("conductor/core/Cargo.toml").exists());
    }
}
