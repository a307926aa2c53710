//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Checker production code MUST NOT sleep. Waiting on a model is
//! bounded by `tokio::time::timeout`, never by sleeping and polling.

use architectural_enforcement::{all_production_lines, assert_no_violations};

#[test]
fn test_no_sleep_in_production_code() {
    let violations: Vec<_> = all_production_lines()
        .into_iter()
        .filter(|l| l.code.contains("thread::sleep") || l.code.contains("time::sleep"))
        .collect();

    assert_no_violations(
        "Sleep calls found in production code",
        "Bound waits with tokio::time::timeout instead",
        &violations,
    );
}
