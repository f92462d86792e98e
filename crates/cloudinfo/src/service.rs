//! HTTP-backed cloud info service.

use crate::error::CloudInfoError;
use crate::iam::IamTokenSource;
use crate::regions::{default_region_prefs, load_region_prefs, RegionPref, RegionTracker};
use crate::versions::{versions_for_platform, VersionsResponse};
use crate::CloudInfo;
use common::config::{DEFAULT_CONTAINERS_ENDPOINT, DEFAULT_IAM_ENDPOINT};
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout for HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for constructing a [`CloudInfoService`].
#[derive(Debug, Clone)]
pub struct CloudInfoServiceOptions {
    pub iam_endpoint: String,
    pub containers_endpoint: String,

    /// Explicit region preference list. Takes precedence over `region_prefs_file`.
    pub region_prefs: Option<Vec<RegionPref>>,

    /// YAML file with the region preference list.
    pub region_prefs_file: Option<PathBuf>,

    pub http_timeout: Duration,
}

impl Default for CloudInfoServiceOptions {
    fn default() -> Self {
        Self {
            iam_endpoint: DEFAULT_IAM_ENDPOINT.to_string(),
            containers_endpoint: DEFAULT_CONTAINERS_ENDPOINT.to_string(),
            region_prefs: None,
            region_prefs_file: None,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

/// Ingress health as reported by the Kubernetes service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IngressStatus {
    pub status: String,

    #[serde(default)]
    pub message: Option<String>,
}

impl IngressStatus {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

/// Cloud info service shared by every scenario of a test run.
///
/// Holds the IAM token cache and the region usage tracker. The HTTP client
/// keeps no idle connections so the service can be used from the separate
/// runtimes that `#[tokio::test]` creates per test.
#[derive(Debug)]
pub struct CloudInfoService {
    containers_endpoint: String,
    tokens: IamTokenSource,
    regions: RegionTracker,
    http_client: reqwest::Client,
}

impl CloudInfoService {
    /// Create a service using the API key held in environment variable `api_key_var`.
    pub fn from_env(
        api_key_var: &str,
        options: CloudInfoServiceOptions,
    ) -> Result<Self, CloudInfoError> {
        let api_key = std::env::var(api_key_var)
            .map_err(|_| CloudInfoError::ApiKeyNotSet(api_key_var.to_string()))?;
        if api_key.is_empty() {
            return Err(CloudInfoError::ApiKeyEmpty(api_key_var.to_string()));
        }
        Self::new(SecretString::from(api_key), options)
    }

    /// Create a service from an explicit API key.
    pub fn new(
        api_key: SecretString,
        options: CloudInfoServiceOptions,
    ) -> Result<Self, CloudInfoError> {
        if api_key.expose_secret().is_empty() {
            return Err(CloudInfoError::Configuration(
                "API key must not be empty".to_string(),
            ));
        }

        let prefs = match (options.region_prefs, options.region_prefs_file) {
            (Some(prefs), _) => prefs,
            (None, Some(path)) => load_region_prefs(&path)?,
            (None, None) => default_region_prefs(),
        };

        let http_client = reqwest::Client::builder()
            .timeout(options.http_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| {
                CloudInfoError::Configuration(format!("Failed to create HTTP client: {e}"))
            })?;

        info!(
            target: "cloudinfo.service",
            containers_endpoint = %options.containers_endpoint,
            regions = prefs.len(),
            "Cloud info service initialized"
        );

        Ok(Self {
            containers_endpoint: options.containers_endpoint.trim_end_matches('/').to_string(),
            tokens: IamTokenSource::new(options.iam_endpoint.trim_end_matches('/'), api_key),
            regions: RegionTracker::new(prefs),
            http_client,
        })
    }

    /// Region usage tracker.
    #[must_use]
    pub fn regions(&self) -> &RegionTracker {
        &self.regions
    }

    async fn get_json<T>(&self, url: &str, query: &[(&str, &str)]) -> Result<T, CloudInfoError>
    where
        T: serde::de::DeserializeOwned,
    {
        let token = self.tokens.token(&self.http_client).await?;

        let response = self
            .http_client
            .get(url)
            .query(query)
            .bearer_auth(token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CloudInfoError::RequestFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CloudInfoError::InvalidResponse {
                url: url.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait::async_trait]
impl CloudInfo for CloudInfoService {
    #[instrument(skip(self))]
    async fn get_kube_versions(&self, platform: &str) -> Result<Vec<String>, CloudInfoError> {
        let url = format!("{}/global/v1/versions", self.containers_endpoint);
        let response: VersionsResponse = self.get_json(&url, &[]).await?;
        let versions = versions_for_platform(&response, platform)?;

        debug!(
            target: "cloudinfo.service",
            platform = %platform,
            versions = ?versions,
            "Fetched Kubernetes versions"
        );

        Ok(versions)
    }

    fn least_used_region(&self) -> Result<String, CloudInfoError> {
        self.regions.acquire()
    }

    fn release_region(&self, region: &str) {
        self.regions.release(region);
    }

    #[instrument(skip(self))]
    async fn cluster_ingress_status(&self, cluster: &str) -> Result<IngressStatus, CloudInfoError> {
        let url = format!("{}/global/v2/alb/getIngressStatus", self.containers_endpoint);
        self.get_json(&url, &[("cluster", cluster)]).await
    }
}
