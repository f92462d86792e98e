//! Kubernetes version selection.
//!
//! Scenarios run on the most recent versions offered by the Kubernetes
//! service, one slot per scenario, counted back from the newest.

use thiserror::Error;
use tracing::warn;

/// Number of version slots used by the scenarios.
pub const VERSION_SLOTS: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("kubernetes version list is empty")]
    Empty,
}

/// Pick `slots` versions from `available` (oldest first), newest first.
///
/// Slot `i` takes `available[len - 1 - i]`. When fewer than `slots`
/// versions exist the remaining slots fall back to the oldest version, so
/// some scenarios share a version.
pub fn select_versions(available: &[String], slots: usize) -> Result<Vec<String>, VersionError> {
    let oldest = available.first().ok_or(VersionError::Empty)?;

    if available.len() < slots {
        warn!(
            target: "iks_tests.versions",
            available = ?available,
            expected = slots,
            "Fewer kubernetes versions than scenarios, some tests will run on duplicate versions"
        );
    }

    Ok((0..slots)
        .map(|i| {
            available
                .len()
                .checked_sub(1 + i)
                .and_then(|idx| available.get(idx))
                .unwrap_or(oldest)
                .clone()
        })
        .collect())
}

/// Versions assigned to each scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IksVersions {
    slots: [String; VERSION_SLOTS],
}

impl IksVersions {
    pub fn from_available(available: &[String]) -> Result<Self, VersionError> {
        let [upgrade, advanced, basic_a, basic_b]: [String; VERSION_SLOTS] =
            select_versions(available, VERSION_SLOTS)?
                .try_into()
                .map_err(|_| VersionError::Empty)?;
        Ok(Self {
            slots: [upgrade, advanced, basic_a, basic_b],
        })
    }

    /// Newest version, used by the upgrade scenario.
    pub fn upgrade(&self) -> &str {
        let [upgrade, ..] = &self.slots;
        upgrade
    }

    pub fn advanced(&self) -> &str {
        let [_, advanced, ..] = &self.slots;
        advanced
    }

    /// The two versions exercised by the basic scenario.
    pub fn basic(&self) -> [&str; 2] {
        let [_, _, a, b] = &self.slots;
        [a.as_str(), b.as_str()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_last_four_newest_first() {
        let selected =
            select_versions(&versions(&["1.28", "1.29", "1.30", "1.31", "1.32"]), 4).unwrap();
        assert_eq!(selected, versions(&["1.32", "1.31", "1.30", "1.29"]));
    }

    #[test]
    fn test_exactly_four() {
        let selected = select_versions(&versions(&["A", "B", "C", "D"]), 4).unwrap();
        assert_eq!(selected, versions(&["D", "C", "B", "A"]));
    }

    #[test]
    fn test_short_list_clamps_to_oldest() {
        assert_eq!(
            select_versions(&versions(&["A"]), 4).unwrap(),
            versions(&["A", "A", "A", "A"])
        );
        assert_eq!(
            select_versions(&versions(&["A", "B"]), 4).unwrap(),
            versions(&["B", "A", "A", "A"])
        );
    }

    #[test]
    fn test_empty_is_error() {
        assert_eq!(select_versions(&[], 4), Err(VersionError::Empty));
        assert_eq!(IksVersions::from_available(&[]), Err(VersionError::Empty));
    }

    #[test]
    fn test_named_slots() {
        let v = IksVersions::from_available(&versions(&["1.29", "1.30", "1.31", "1.32"])).unwrap();
        assert_eq!(v.upgrade(), "1.32");
        assert_eq!(v.advanced(), "1.31");
        assert_eq!(v.basic(), ["1.30", "1.29"]);
    }
}
