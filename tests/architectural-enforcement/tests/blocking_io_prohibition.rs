//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async functions in the checker crates MUST NOT do blocking I/O.
//! SQLite work goes through `spawn_blocking`; file and network access use
//! `tokio::fs` and `tokio::net`. Plain functions that run before the runtime
//! starts (config loading) may block.

use architectural_enforcement::{all_production_lines, assert_no_violations};

const BLOCKING_CALLS: &[&str] = &[
    "std::fs::",
    "std::net::",
    "std::process::Command",
    "reqwest::blocking",
    "std::io::stdin()",
];

#[test]
fn test_no_blocking_io_in_async_functions() {
    let violations: Vec<_> = all_production_lines()
        .into_iter()
        .filter(|l| l.in_async_fn)
        .filter(|l| BLOCKING_CALLS.iter().any(|call| l.code.contains(call)))
        .collect();

    assert_no_violations(
        "Blocking I/O calls found in async code",
        "Use tokio::fs, tokio::net, or tokio::task::spawn_blocking",
        &violations,
    );
}

#[test]
fn test_no_blocking_http_client_anywhere() {
    let violations: Vec<_> = all_production_lines()
        .into_iter()
        .filter(|l| l.code.contains("reqwest::blocking"))
        .collect();

    assert_no_violations(
        "Blocking HTTP client used",
        "Use the async reqwest::Client",
        &violations,
    );
}
