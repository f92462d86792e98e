//! Soft assertions.
//!
//! Scenario checks record failures instead of panicking so that one failed
//! check does not hide the next one, and so that the post-apply hook can
//! report problems without aborting the run. The caller reads
//! [`SoftAssert::failures`] once the run is over.

use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::error;

/// Thread-safe recorder of assertion failures.
///
/// Clones share the same failure list.
#[derive(Debug, Clone, Default)]
pub struct SoftAssert {
    failures: Arc<Mutex<Vec<String>>>,
}

impl SoftAssert {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure.
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        error!(target: "testhelper.assertions", failure = %message, "Assertion failed");
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    /// Record a failure when `result` is an error. Returns whether it was `Ok`.
    pub fn no_error<T, E: Display>(&self, result: &Result<T, E>, message: &str) -> bool {
        match result {
            Ok(_) => true,
            Err(e) => {
                self.fail(format!("{message}: {e}"));
                false
            }
        }
    }

    /// Record a failure when `value` is `None`. Returns whether it was `Some`.
    pub fn is_some<T>(&self, value: Option<&T>, message: &str) -> bool {
        if value.is_some() {
            true
        } else {
            self.fail(message);
            false
        }
    }

    pub fn failures(&self) -> Vec<String> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_records_and_continues() {
        let asserts = SoftAssert::new();

        let err: Result<(), String> = Err("apply failed".to_string());
        assert!(!asserts.no_error(&err, "This should not have errored"));
        assert!(!asserts.is_some::<u32>(None, "Expected some output"));
        assert!(asserts.is_some(Some(&1), "never recorded"));

        assert_eq!(
            asserts.failures(),
            vec![
                "This should not have errored: apply failed".to_string(),
                "Expected some output".to_string(),
            ]
        );
    }

    #[test]
    fn test_clones_share_failures() {
        let asserts = SoftAssert::new();
        let clone = asserts.clone();

        clone.fail("from the hook");

        assert_eq!(asserts.failures(), vec!["from the hook".to_string()]);
    }

    #[test]
    fn test_clean_run_has_no_failures() {
        let asserts = SoftAssert::new();
        assert!(asserts.no_error(&Ok::<_, String>(1), "unused"));
        assert!(asserts.is_some(Some(&1), "unused"));
        assert!(asserts.failures().is_empty());
    }
}
