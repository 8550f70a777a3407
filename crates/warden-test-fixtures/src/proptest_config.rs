//! Shared proptest case count for Warden property suites.
//!
//! `PROPTEST_CASES` overrides the default:
//!
//! ```bash
//! PROPTEST_CASES=500 cargo test -p warden-core
//! ```

use proptest::test_runner::Config as ProptestConfig;

/// Cases per property when `PROPTEST_CASES` is unset. Each case builds a
/// fresh model and node graph, so keep this modest.
pub const DEFAULT_PROPTEST_CASES: u32 = 48;

/// Number of cases to run, from `PROPTEST_CASES` or the default
#[must_use]
pub fn test_cases() -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_PROPTEST_CASES)
}

#[must_use]
pub fn proptest_config() -> ProptestConfig {
    ProptestConfig::with_cases(test_cases())
}
