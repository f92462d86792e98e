//! Kubernetes version list parsing.

use crate::error::CloudInfoError;
use serde::Deserialize;
use std::collections::HashMap;

/// Platform name for vanilla IKS clusters.
pub const PLATFORM_KUBERNETES: &str = "kubernetes";

/// Platform name for Red Hat OpenShift clusters.
pub const PLATFORM_OPENSHIFT: &str = "openshift";

/// One entry of the `/global/v1/versions` response.
#[derive(Debug, Clone, Deserialize)]
pub struct KubeVersion {
    pub major: u32,
    pub minor: u32,
    #[serde(default)]
    pub patch: u32,
    #[serde(default)]
    pub default: bool,
}

/// Response body of `/global/v1/versions`, keyed by platform.
pub type VersionsResponse = HashMap<String, Vec<KubeVersion>>;

/// Extract the version strings for `platform`, oldest first.
///
/// Kubernetes versions are rendered as `major.minor`, which is what the
/// module's `kube_version` input accepts. OpenShift versions carry the
/// `_openshift` suffix the service expects.
pub fn versions_for_platform(
    response: &VersionsResponse,
    platform: &str,
) -> Result<Vec<String>, CloudInfoError> {
    let entries = response
        .get(platform)
        .ok_or_else(|| CloudInfoError::UnknownPlatform(platform.to_string()))?;

    let mut pairs: Vec<(u32, u32)> = entries.iter().map(|v| (v.major, v.minor)).collect();
    pairs.sort_unstable();
    pairs.dedup();

    let suffix = if platform == PLATFORM_OPENSHIFT {
        "_openshift"
    } else {
        ""
    };

    Ok(pairs
        .into_iter()
        .map(|(major, minor)| format!("{major}.{minor}{suffix}"))
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample() -> VersionsResponse {
        serde_json::from_value(serde_json::json!({
            "kubernetes": [
                {"major": 1, "minor": 31, "patch": 2, "default": false},
                {"major": 1, "minor": 29, "patch": 10, "default": false},
                {"major": 1, "minor": 30, "patch": 6, "default": true},
                {"major": 1, "minor": 30, "patch": 5, "default": false}
            ],
            "openshift": [
                {"major": 4, "minor": 15, "patch": 30},
                {"major": 4, "minor": 14, "patch": 38}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_kubernetes_versions_sorted_and_deduplicated() {
        let versions = versions_for_platform(&sample(), PLATFORM_KUBERNETES).unwrap();
        assert_eq!(versions, vec!["1.29", "1.30", "1.31"]);
    }

    #[test]
    fn test_openshift_versions_have_suffix() {
        let versions = versions_for_platform(&sample(), PLATFORM_OPENSHIFT).unwrap();
        assert_eq!(versions, vec!["4.14_openshift", "4.15_openshift"]);
    }

    #[test]
    fn test_unknown_platform_fails() {
        let err = versions_for_platform(&sample(), "nomad").unwrap_err();
        assert!(matches!(err, CloudInfoError::UnknownPlatform(p) if p == "nomad"));
    }

    #[test]
    fn test_empty_platform_list_is_ok() {
        let response: VersionsResponse =
            serde_json::from_value(serde_json::json!({"kubernetes": []})).unwrap();
        let versions = versions_for_platform(&response, PLATFORM_KUBERNETES).unwrap();
        assert!(versions.is_empty());
    }
}
