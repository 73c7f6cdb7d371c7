//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async functions in production code MUST NOT use blocking I/O.
//! **Required**: `tokio::fs`, `tokio::net`, `tokio::io`, async `reqwest`.
//! The `print!` family writes to locked std handles and counts as blocking.
//!
//! Blocking calls are acceptable in non-async functions (config loading runs
//! before any stream is opened) and in test code.

use architectural_enforcement::{code_part, is_in_async_function, production_sources};

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_code() {
    let mut violations = Vec::new();

    for file in production_sources() {
        for (idx, line) in file.lines.iter().enumerate() {
            let code = code_part(line);

            if code.contains("reqwest::blocking") {
                violations.push(file.violation(idx, "Blocking HTTP client"));
                continue;
            }

            if !is_in_async_function(&file.lines, idx) {
                continue;
            }

            if code.contains("std::fs::") {
                violations.push(file.violation(idx, "Blocking file I/O"));
            }
            if code.contains("std::net::") {
                violations.push(file.violation(idx, "Blocking network I/O"));
            }
            if code.contains("std::process::Command") {
                violations.push(file.violation(idx, "Blocking process I/O"));
            }
            if code.contains("std::io::stdin()") || code.contains("std::io::stdout()") {
                violations.push(file.violation(idx, "Blocking stdin/stdout"));
            }
            if code.contains("println!(") || code.contains("print!(") {
                violations.push(file.violation(idx, "Blocking print macro"));
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\nBlocking I/O found in async production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nUse tokio::fs, tokio::net, tokio::io::stdin()/stdout() instead.");
        panic!("Found {} blocking I/O violation(s)", violations.len());
    }
}
