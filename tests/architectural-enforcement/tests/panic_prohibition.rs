//! Integration Test: Errors Are Propagated, Not Panicked
//!
//! A panicking worker publishes nothing and reports nothing, so failures
//! must travel as `Result`s into the error collector.
//!
//! **Policy**: Production code MUST NOT call `unwrap()` or `expect()`.
//! **Required**: `?`, `map_err`, or an explicit fallback.

use architectural_enforcement::find_violations;

#[test]
fn test_no_unwrap_or_expect_in_production_code() {
    let violations = find_violations(&[".unwrap()", ".expect("]);

    if !violations.is_empty() {
        eprintln!("\n❌ unwrap()/expect() found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        panic!(
            "\nFound {} unwrap/expect call(s) in production code.",
            violations.len()
        );
    }
}
