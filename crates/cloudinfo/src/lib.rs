//! Cloud info service.
//!
//! Shared, process-wide view of the cloud account used by the IKS module
//! tests:
//!
//! - Kubernetes versions currently offered by the Kubernetes service
//! - Region usage tracking so parallel scenarios spread across regions
//! - Cluster ingress status for post-apply health checks
//!
//! Calls are authenticated with an IAM token exchanged from the API key
//! (see [`iam`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use cloudinfo::{CloudInfo, CloudInfoService, CloudInfoServiceOptions};
//!
//! let service = CloudInfoService::from_env(
//!     "TF_VAR_ibmcloud_api_key",
//!     CloudInfoServiceOptions::default(),
//! )?;
//! let versions = service.get_kube_versions("kubernetes").await?;
//! let region = service.least_used_region()?;
//! ```

pub mod error;
pub mod iam;
pub mod regions;
pub mod service;
pub mod versions;

pub use error::CloudInfoError;
pub use regions::{RegionPref, RegionTracker};
pub use service::{CloudInfoService, CloudInfoServiceOptions, IngressStatus};

/// Cloud info operations used by the test harness (enables mocking).
#[async_trait::async_trait]
pub trait CloudInfo: Send + Sync + std::fmt::Debug {
    /// Valid versions for `platform` (`kubernetes` or `openshift`), oldest first.
    async fn get_kube_versions(&self, platform: &str) -> Result<Vec<String>, CloudInfoError>;

    /// Pick the least-used test region and mark it as in use.
    fn least_used_region(&self) -> Result<String, CloudInfoError>;

    /// Mark one use of `region` as finished.
    fn release_region(&self, region: &str);

    /// Current ingress status of a cluster.
    async fn cluster_ingress_status(&self, cluster: &str) -> Result<IngressStatus, CloudInfoError>;
}

/// Mock cloud info service for unit testing.
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    /// Mock cloud info service.
    ///
    /// Ingress statuses are returned in sequence; the last one repeats.
    #[derive(Debug)]
    pub struct MockCloudInfo {
        versions: Option<Vec<String>>,
        ingress: Mutex<VecDeque<IngressStatus>>,
        regions: RegionTracker,
        ingress_calls: AtomicUsize,
    }

    impl MockCloudInfo {
        /// Mock that reports `versions` and a healthy ingress.
        pub fn with_versions(versions: &[&str]) -> Self {
            Self {
                versions: Some(versions.iter().map(|v| (*v).to_string()).collect()),
                ingress: Mutex::new(VecDeque::from([Self::status("healthy")])),
                regions: RegionTracker::new(vec![RegionPref::new("us-south", 1)]),
                ingress_calls: AtomicUsize::new(0),
            }
        }

        /// Mock whose version lookup fails.
        pub fn failing_versions() -> Self {
            Self {
                versions: None,
                ..Self::with_versions(&[])
            }
        }

        /// Replace the ingress status sequence.
        #[must_use]
        pub fn with_ingress(self, statuses: &[&str]) -> Self {
            *self.ingress.lock().unwrap_or_else(PoisonError::into_inner) =
                statuses.iter().map(|s| Self::status(s)).collect();
            self
        }

        /// Number of ingress status queries made.
        pub fn ingress_calls(&self) -> usize {
            self.ingress_calls.load(Ordering::SeqCst)
        }

        /// Region tracker backing the mock.
        pub fn regions(&self) -> &RegionTracker {
            &self.regions
        }

        fn status(status: &str) -> IngressStatus {
            IngressStatus {
                status: status.to_string(),
                message: None,
            }
        }
    }

    #[async_trait::async_trait]
    impl CloudInfo for MockCloudInfo {
        async fn get_kube_versions(&self, platform: &str) -> Result<Vec<String>, CloudInfoError> {
            self.versions
                .clone()
                .ok_or_else(|| CloudInfoError::UnknownPlatform(platform.to_string()))
        }

        fn least_used_region(&self) -> Result<String, CloudInfoError> {
            self.regions.acquire()
        }

        fn release_region(&self, region: &str) {
            self.regions.release(region);
        }

        async fn cluster_ingress_status(
            &self,
            _cluster: &str,
        ) -> Result<IngressStatus, CloudInfoError> {
            self.ingress_calls.fetch_add(1, Ordering::SeqCst);
            let mut statuses = self.ingress.lock().unwrap_or_else(PoisonError::into_inner);
            let status = if statuses.len() > 1 {
                statuses.pop_front()
            } else {
                statuses.front().cloned()
            };
            status.ok_or_else(|| CloudInfoError::InvalidResponse {
                url: "mock".to_string(),
                message: "no ingress status configured".to_string(),
            })
        }
    }

}
