//! Integration Test: Sleep Prohibition
//!
//! **Policy**: production code MUST NOT call sleep. Streams are awaited, not
//! polled; the only waiting in this workspace is on I/O.

use architectural_enforcement::{code_part, production_sources};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let mut violations = Vec::new();

    for file in production_sources() {
        for (idx, line) in file.lines.iter().enumerate() {
            let code = code_part(line);
            if code.contains("::sleep(") || code.contains(".sleep(") {
                violations.push(file.violation(idx, "Sleep call"));
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nAwait the I/O you are waiting for, or use tokio::time::interval().");
        panic!("Found {} sleep violation(s)", violations.len());
    }
}

/// Integration tests must wait on I/O too
#[test]
fn test_no_sleep_in_integration_tests() {
    let root = architectural_enforcement::workspace_root();
    let mut violations = Vec::new();

    for dir in ["conductor/core/tests", "conductor/chat/tests"] {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&path).into_iter().filter_map(Result::ok) {
            if entry.path().extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let content = std::fs::read_to_string(entry.path()).unwrap();
            for (idx, line) in content.lines().enumerate() {
                let code = code_part(line);
                if code.contains("::sleep(") || code.contains(".sleep(") {
                    violations.push(format!("{}:{}: {}", entry.path().display(), idx + 1, line.trim()));
                }
            }
        }
    }

    assert!(
        violations.is_empty(),
        "Sleep calls in integration tests:\n{}",
        violations.join("\n")
    );
}
