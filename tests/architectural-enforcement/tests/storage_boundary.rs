//! Integration Test: Storage Boundary
//!
//! **Policy**: only `checker/core/src/store.rs` talks to SQLite. The pipeline
//! and the daemon see storage through the `QueryStore` trait.

use architectural_enforcement::{all_production_lines, assert_no_violations};

#[test]
fn test_sqlite_only_used_by_store_module() {
    let violations: Vec<_> = all_production_lines()
        .into_iter()
        .filter(|l| l.code.contains("rusqlite"))
        .filter(|l| !l.path.ends_with("checker/core/src/store.rs"))
        .collect();

    assert_no_violations(
        "rusqlite used outside the store module",
        "Go through QueryStore, or add the operation to SqliteQueryStore",
        &violations,
    );
}

#[test]
fn test_daemon_does_not_build_prompts_or_parse_replies() {
    let violations: Vec<_> = all_production_lines()
        .into_iter()
        .filter(|l| l.path.to_string_lossy().contains("checker/daemon/src"))
        .filter(|l| l.code.contains("build_prompt") || l.code.contains("normalize("))
        .collect();

    assert_no_violations(
        "Daemon reaches into pipeline internals",
        "Call QueryPipeline::analyze and let it prompt and normalize",
        &violations,
    );
}
