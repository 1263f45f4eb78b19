//! Integration Test: No Blocking Calls on the Dispatch Path
//!
//! Workers run on the Tokio runtime and hold admission permits while they
//! wait on the backend. A blocking call there stalls a runtime thread with a
//! permit held.
//!
//! **Policy**: Production code MUST NOT sleep threads, use blocking HTTP, or
//! re-enter the runtime.
//! **Required**: `tokio::time::sleep`, async `reqwest`, `.await`.

use architectural_enforcement::find_violations;

const FORBIDDEN: &[&str] = &[
    "std::thread::sleep",
    "thread::sleep(",
    "reqwest::blocking",
    "block_on(",
    "block_in_place(",
];

#[test]
fn test_no_blocking_calls_in_production_code() {
    let violations = find_violations(FORBIDDEN);

    if !violations.is_empty() {
        eprintln!("\n❌ Blocking calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ REQUIRED async equivalents:");
        eprintln!("  - tokio::time::sleep(..).await");
        eprintln!("  - reqwest::Client (async)");
        eprintln!("  - .await instead of block_on");

        panic!(
            "\nFound {} blocking call(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}
