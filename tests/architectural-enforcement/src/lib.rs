//! Architectural Enforcement Integration Tests
//!
//! Source scans that keep the checker crates honest:
//! - No sleep calls in production code
//! - No blocking I/O inside async functions
//! - SQLite is only touched by the store module
//!
//! The helpers here walk `checker/*/src` relative to this package and give
//! each test the production lines it should look at.

use std::fs;
use std::path::{Path, PathBuf};

/// One non-test, non-comment source line
#[derive(Debug, Clone)]
pub struct SourceLine {
    /// File the line came from
    pub path: PathBuf,
    /// 1-based line number
    pub number: usize,
    /// Line text with any trailing `//` comment removed
    pub code: String,
    /// Whether the nearest enclosing `fn` is `async`
    pub in_async_fn: bool,
}

impl std::fmt::Display for SourceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.number, self.code.trim())
    }
}

/// Root of the workspace this package lives in
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Production source directories of the checker crates
pub fn production_dirs() -> Vec<PathBuf> {
    let root = workspace_root();
    vec![
        root.join("checker/core/src"),
        root.join("checker/daemon/src"),
    ]
}

/// Files that exist only to support tests and are exempt from the scans
pub const TEST_SUPPORT_FILES: &[&str] = &["test_utils.rs"];

/// All `.rs` files under `dir`, minus test support files
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }

    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .map(walkdir::DirEntry::into_path)
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("rs"))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(true, |n| !TEST_SUPPORT_FILES.contains(&n))
        })
        .collect()
}

/// Production lines of one file
///
/// Everything from the first `#[cfg(test)]` onward is treated as test code,
/// matching the layout used throughout the checker crates.
pub fn production_lines(path: &Path) -> Vec<SourceLine> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };

    let mut lines = Vec::new();
    let mut in_async_fn = false;

    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }
        if trimmed.starts_with("//") {
            continue;
        }

        if let Some(pos) = trimmed.find("fn ") {
            let head = &trimmed[..pos];
            if head.is_empty() || head.ends_with(' ') {
                in_async_fn = head.contains("async");
            }
        }

        let code = line.split("//").next().unwrap_or(line).to_string();
        lines.push(SourceLine {
            path: path.to_path_buf(),
            number: idx + 1,
            code,
            in_async_fn,
        });
    }

    lines
}

/// Production lines of every checker crate
pub fn all_production_lines() -> Vec<SourceLine> {
    production_dirs()
        .iter()
        .flat_map(|dir| rust_files(dir))
        .flat_map(|file| production_lines(&file))
        .collect()
}

/// Report violations and fail the calling test if there are any
///
/// # Panics
///
/// Panics when `violations` is not empty.
pub fn assert_no_violations(rule: &str, hint: &str, violations: &[SourceLine]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n❌ {rule}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    eprintln!("\n✅ {hint}");

    panic!(
        "\nFound {} violation(s) of: {rule}\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scans_find_the_checker_sources() {
        let files: Vec<_> = production_dirs().iter().flat_map(|d| rust_files(d)).collect();
        assert!(files.iter().any(|p| p.ends_with("store.rs")));
        assert!(files.iter().any(|p| p.ends_with("routes.rs")));
        assert!(!files.iter().any(|p| p.ends_with("test_utils.rs")));
    }

    #[test]
    fn test_async_context_is_tracked() {
        let store = workspace_root().join("checker/core/src/store.rs");
        let lines = production_lines(&store);
        let open = lines
            .iter()
            .find(|l| l.code.contains("pub async fn open("))
            .unwrap();
        assert!(open.in_async_fn);
    }
}
