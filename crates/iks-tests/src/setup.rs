//! One-time test setup.
//!
//! Every scenario shares one [`TestContext`]: the cloud info service (so
//! region usage is tracked across parallel scenarios), the permanent
//! resources map and the selected Kubernetes versions. Setup failures end
//! the whole test process, since no scenario can run without them.

use crate::versions::{IksVersions, VersionError};
use cloudinfo::versions::PLATFORM_KUBERNETES;
use cloudinfo::{CloudInfo, CloudInfoError, CloudInfoService, CloudInfoServiceOptions};
use common::config::{ConfigError, HarnessConfig};
use common::resources::{PermanentResources, ResourceError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to create cloud info service: {0}")]
    CloudInfo(#[from] CloudInfoError),

    #[error(transparent)]
    Resources(#[from] ResourceError),

    #[error("failed to get kube versions: {0}")]
    Versions(#[source] CloudInfoError),

    #[error(transparent)]
    NoVersions(#[from] VersionError),

    #[error("Failed to start setup runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Setup thread panicked")]
    Thread,
}

/// State shared read-only by every scenario.
#[derive(Debug)]
pub struct TestContext {
    pub config: HarnessConfig,
    pub cloud_info: Arc<dyn CloudInfo>,
    pub permanent_resources: PermanentResources,
    pub versions: IksVersions,
}

impl TestContext {
    /// Build the context against the real cloud info service.
    pub async fn setup(config: HarnessConfig) -> Result<Self, SetupError> {
        let options = CloudInfoServiceOptions {
            iam_endpoint: config.iam_endpoint.clone(),
            containers_endpoint: config.containers_endpoint.clone(),
            region_prefs_file: config.region_prefs_path.clone(),
            ..CloudInfoServiceOptions::default()
        };
        let service = CloudInfoService::from_env(&config.api_key_var, options)?;
        Self::with_cloud_info(config, Arc::new(service)).await
    }

    /// Build the context with the given cloud info implementation.
    pub async fn with_cloud_info(
        config: HarnessConfig,
        cloud_info: Arc<dyn CloudInfo>,
    ) -> Result<Self, SetupError> {
        let permanent_resources = PermanentResources::load(&config.permanent_resources_path)?;

        let available = cloud_info
            .get_kube_versions(PLATFORM_KUBERNETES)
            .await
            .map_err(SetupError::Versions)?;
        let versions = IksVersions::from_available(&available)?;

        info!(
            target: "iks_tests.setup",
            available = ?available,
            upgrade = versions.upgrade(),
            advanced = versions.advanced(),
            basic = ?versions.basic(),
            "Kubernetes versions selected"
        );

        Ok(Self {
            config,
            cloud_info,
            permanent_resources,
            versions,
        })
    }
}

/// Root of the module repository. The harness workspace lives in the
/// module's `tests/` directory, so this is three levels above this crate.
///
/// Anchored at build time: cargo runs each test binary from its crate
/// directory, not from the workspace.
pub fn default_module_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .ancestors()
        .nth(3)
        .unwrap_or(manifest_dir)
        .to_path_buf()
}

static CONTEXT: OnceLock<TestContext> = OnceLock::new();

/// The shared context, built on first use.
///
/// Exits the process when setup fails.
pub fn shared() -> &'static TestContext {
    CONTEXT.get_or_init(|| build_shared().unwrap_or_else(|e| abort(&e)))
}

/// Setup runs on its own thread and runtime: callers are usually inside a
/// `#[tokio::test]` runtime, which cannot be blocked on.
fn build_shared() -> Result<TestContext, SetupError> {
    crate::init_tracing();
    let config = HarnessConfig::from_env(&default_module_root())?;

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(SetupError::Runtime)?;
        runtime.block_on(TestContext::setup(config))
    })
    .join()
    .map_err(|_| SetupError::Thread)?
}

/// Log a fatal error and end the test process with exit code 1.
pub fn abort(err: &dyn std::error::Error) -> ! {
    error!(target: "iks_tests.setup", error = %err, "Fatal test setup error");
    eprintln!("{err}");
    std::process::exit(1)
}
