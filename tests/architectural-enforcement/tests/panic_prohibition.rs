//! Integration Test: Panic Prohibition
//!
//! **Policy**: production code propagates errors. `unwrap()`, `expect()`,
//! `todo!()` and `unimplemented!()` are only allowed in test code.

use architectural_enforcement::{code_part, production_sources};

const FORBIDDEN: &[(&str, &str)] = &[
    (".unwrap()", "unwrap()"),
    (".expect(", "expect()"),
    ("todo!(", "todo!()"),
    ("unimplemented!(", "unimplemented!()"),
];

#[test]
fn test_no_panicking_shortcuts_in_production_code() {
    let mut violations = Vec::new();

    for file in production_sources() {
        for (idx, line) in file.lines.iter().enumerate() {
            let code = code_part(line);
            for (pattern, name) in FORBIDDEN {
                if code.contains(pattern) {
                    violations.push(file.violation(idx, name));
                }
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\nPanicking shortcuts found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nReturn a Result and use `?`, or handle the None/Err case.");
        panic!("Found {} violation(s)", violations.len());
    }
}

#[test]
fn test_production_sources_are_found() {
    let files = production_sources();
    assert!(
        files.iter().any(|f| f.path.ends_with("conductor/core/src/conversation.rs")),
        "scanner did not find the core sources"
    );
    assert!(files.iter().any(|f| f.path.ends_with("conductor/chat/src/main.rs")));
}
