//! Per-scenario test options.

use crate::assertions::SoftAssert;
use crate::error::RunError;
use crate::git::{GitCli, SourceControl};
use crate::health::{wait_for_ingress_healthy, PollSchedule};
use crate::outputs::Outputs;
use crate::plan::{Exemptions, PlanExemptions};
use crate::terraform::{Terraform, TerraformCli, TerraformRun};
use cloudinfo::CloudInfo;
use common::config::DEFAULT_UPGRADE_BASE_REF;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Length of the random suffix appended to resource prefixes.
pub const PREFIX_SUFFIX_LEN: usize = 6;

/// Future returned by a post-apply hook.
pub type HookFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// Callback run after a successful apply, before the consistency plan.
pub type PostApplyHook = Arc<dyn for<'a> Fn(&'a TestOptions) -> HookFuture<'a> + Send + Sync>;

/// Wrap a function or closure as a [`PostApplyHook`].
pub fn post_apply_hook<F>(hook: F) -> PostApplyHook
where
    F: for<'a> Fn(&'a TestOptions) -> HookFuture<'a> + Send + Sync + 'static,
{
    Arc::new(hook)
}

/// Options for one consistency or upgrade run.
///
/// Built fresh per scenario. Set the scenario fields, then call
/// [`TestOptions::default_with_vars`] to fill in the prefix suffix, region
/// and standard variables.
pub struct TestOptions {
    /// Directory of the example to run, relative to `module_root`.
    pub terraform_dir: String,
    pub prefix: String,
    pub resource_group: Option<String>,
    /// Region to deploy into; picked from the least-used regions when unset.
    pub region: Option<String>,
    pub cloud_info: Arc<dyn CloudInfo>,

    pub ignore_adds: Exemptions,
    pub ignore_updates: Exemptions,
    pub ignore_destroys: Exemptions,

    pub terraform_vars: BTreeMap<String, serde_json::Value>,
    /// Extra environment for Terraform commands.
    pub terraform_env: BTreeMap<String, String>,

    /// Apply the new code during an upgrade run and re-check consistency.
    pub check_apply_result_for_upgrade: bool,
    pub post_apply_hook: Option<PostApplyHook>,

    /// Root of the module repository (copied for each run).
    pub module_root: PathBuf,
    pub upgrade_base_ref: String,
    pub skip_test_teardown: bool,
    pub do_not_destroy_on_failure: bool,
    pub ingress_poll: PollSchedule,

    pub terraform: Arc<dyn Terraform>,
    pub source_control: Arc<dyn SourceControl>,
    pub assertions: SoftAssert,

    /// Set by an upgrade run that was skipped.
    pub upgrade_test_skipped: bool,
    pub upgrade_skip_reason: Option<String>,

    pub(crate) terraform_run: Option<TerraformRun>,
    pub(crate) region_acquired: bool,
}

impl TestOptions {
    pub fn new(cloud_info: Arc<dyn CloudInfo>) -> Self {
        Self {
            terraform_dir: String::new(),
            prefix: String::new(),
            resource_group: None,
            region: None,
            cloud_info,
            ignore_adds: Exemptions::default(),
            ignore_updates: Exemptions::default(),
            ignore_destroys: Exemptions::default(),
            terraform_vars: BTreeMap::new(),
            terraform_env: BTreeMap::new(),
            check_apply_result_for_upgrade: false,
            post_apply_hook: None,
            module_root: PathBuf::from(".."),
            upgrade_base_ref: DEFAULT_UPGRADE_BASE_REF.to_string(),
            skip_test_teardown: false,
            do_not_destroy_on_failure: false,
            ingress_poll: PollSchedule::default(),
            terraform: Arc::new(TerraformCli::default()),
            source_control: Arc::new(GitCli),
            assertions: SoftAssert::new(),
            upgrade_test_skipped: false,
            upgrade_skip_reason: None,
            terraform_run: None,
            region_acquired: false,
        }
    }

    /// Fill in defaults derived from the scenario fields.
    ///
    /// - appends a random suffix to `prefix`
    /// - picks the least-used region when `region` is unset
    /// - adds `prefix`, `region` and `resource_group` variables unless the
    ///   caller already set them
    pub fn default_with_vars(mut self) -> Result<Self, RunError> {
        if self.prefix.is_empty() {
            return Err(RunError::Options("prefix must not be empty".to_string()));
        }
        if self.terraform_dir.is_empty() {
            return Err(RunError::Options(
                "terraform_dir must not be empty".to_string(),
            ));
        }

        let suffix: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(PREFIX_SUFFIX_LEN)
            .collect();
        self.prefix = format!("{}-{suffix}", self.prefix);

        let region = match &self.region {
            Some(region) => region.clone(),
            None => {
                let region = self.cloud_info.least_used_region()?;
                self.region_acquired = true;
                self.region = Some(region.clone());
                region
            }
        };

        let mut defaults = vec![
            ("prefix", serde_json::Value::from(self.prefix.clone())),
            ("region", serde_json::Value::from(region)),
        ];
        if let Some(rg) = &self.resource_group {
            defaults.push(("resource_group", serde_json::Value::from(rg.clone())));
        }
        for (key, value) in defaults {
            self.terraform_vars
                .entry(key.to_string())
                .or_insert(value);
        }

        info!(
            target: "testhelper.options",
            prefix = %self.prefix,
            region = ?self.region,
            terraform_dir = %self.terraform_dir,
            "Test options ready"
        );

        Ok(self)
    }

    pub fn exemptions(&self) -> PlanExemptions {
        PlanExemptions {
            ignore_adds: self.ignore_adds.clone(),
            ignore_updates: self.ignore_updates.clone(),
            ignore_destroys: self.ignore_destroys.clone(),
        }
    }

    /// Run directory of the current or last run.
    pub fn terraform_run(&self) -> Option<&TerraformRun> {
        self.terraform_run.as_ref()
    }

    /// All outputs of the last apply of the current run.
    pub async fn last_apply_outputs(&self) -> Result<Outputs, RunError> {
        let run = self
            .terraform_run
            .as_ref()
            .ok_or_else(|| RunError::Options("no terraform run in progress".to_string()))?;
        Ok(self.terraform.output_all(run).await?)
    }

    /// Wait for the cluster's ingress to become healthy, recording a soft
    /// assertion failure otherwise. Returns whether it became healthy.
    pub async fn check_cluster_ingress_healthy(&self, cluster: &str, timeout: Duration) -> bool {
        let schedule = PollSchedule {
            timeout,
            ..self.ingress_poll
        };
        match wait_for_ingress_healthy(self.cloud_info.as_ref(), cluster, schedule).await {
            Ok(()) => true,
            Err(e) => {
                self.assertions.fail(e.to_string());
                false
            }
        }
    }

    /// [`TestOptions::check_cluster_ingress_healthy`] with the configured
    /// poll timeout (15 minutes unless changed).
    pub async fn check_cluster_ingress_healthy_default_timeout(&self, cluster: &str) -> bool {
        self.check_cluster_ingress_healthy(cluster, self.ingress_poll.timeout)
            .await
    }

    /// Hand the region back to the usage tracker, once.
    pub(crate) fn release_region(&mut self) {
        if !self.region_acquired {
            return;
        }
        self.region_acquired = false;
        if let Some(region) = &self.region {
            debug!(target: "testhelper.options", region = %region, "Releasing region");
            self.cloud_info.release_region(region);
        }
    }
}

impl Drop for TestOptions {
    fn drop(&mut self) {
        self.release_region();
    }
}

impl fmt::Debug for TestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestOptions")
            .field("terraform_dir", &self.terraform_dir)
            .field("prefix", &self.prefix)
            .field("resource_group", &self.resource_group)
            .field("region", &self.region)
            .field("ignore_adds", &self.ignore_adds.list)
            .field("ignore_updates", &self.ignore_updates.list)
            .field("ignore_destroys", &self.ignore_destroys.list)
            .field("terraform_vars", &self.terraform_vars.keys().collect::<Vec<_>>())
            .field(
                "check_apply_result_for_upgrade",
                &self.check_apply_result_for_upgrade,
            )
            .field("post_apply_hook", &self.post_apply_hook.is_some())
            .field("module_root", &self.module_root)
            .field("upgrade_base_ref", &self.upgrade_base_ref)
            .field("skip_test_teardown", &self.skip_test_teardown)
            .field("do_not_destroy_on_failure", &self.do_not_destroy_on_failure)
            .field("upgrade_test_skipped", &self.upgrade_test_skipped)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use cloudinfo::mock::MockCloudInfo;

    fn options(cloud_info: Arc<MockCloudInfo>) -> TestOptions {
        let mut options = TestOptions::new(cloud_info);
        options.prefix = "base-iks".to_string();
        options.terraform_dir = "examples/basic".to_string();
        options.resource_group = Some("geretain-test-resources".to_string());
        options
    }

    #[test]
    fn test_default_with_vars_fills_prefix_region_and_vars() {
        let cloud = Arc::new(MockCloudInfo::with_versions(&[]));
        let options = options(cloud.clone()).default_with_vars().unwrap();

        let suffix = options.prefix.strip_prefix("base-iks-").unwrap();
        assert_eq!(suffix.len(), PREFIX_SUFFIX_LEN);
        assert_eq!(options.region.as_deref(), Some("us-south"));
        assert_eq!(options.terraform_vars["prefix"], options.prefix.as_str());
        assert_eq!(options.terraform_vars["region"], "us-south");
        assert_eq!(
            options.terraform_vars["resource_group"],
            "geretain-test-resources"
        );
        assert_eq!(cloud.regions().usage("us-south"), 1);
    }

    #[test]
    fn test_new_uses_harness_default_base_ref() {
        let options = TestOptions::new(Arc::new(MockCloudInfo::with_versions(&[])));
        assert_eq!(options.upgrade_base_ref, "origin/main");
        assert_eq!(options.upgrade_base_ref, DEFAULT_UPGRADE_BASE_REF);
    }

    #[test]
    fn test_prefixes_are_unique() {
        let cloud = Arc::new(MockCloudInfo::with_versions(&[]));
        let a = options(cloud.clone()).default_with_vars().unwrap();
        let b = options(cloud).default_with_vars().unwrap();
        assert_ne!(a.prefix, b.prefix);
    }

    #[test]
    fn test_caller_vars_and_region_win() {
        let cloud = Arc::new(MockCloudInfo::with_versions(&[]));
        let mut opts = options(cloud.clone());
        opts.region = Some("eu-de".to_string());
        opts.terraform_vars
            .insert("region".to_string(), serde_json::json!("jp-tok"));

        let opts = opts.default_with_vars().unwrap();
        assert_eq!(opts.region.as_deref(), Some("eu-de"));
        assert_eq!(opts.terraform_vars["region"], "jp-tok");
        assert_eq!(cloud.regions().usage("us-south"), 0);
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let cloud = Arc::new(MockCloudInfo::with_versions(&[]));
        let mut opts = options(cloud);
        opts.prefix.clear();
        assert!(matches!(
            opts.default_with_vars(),
            Err(RunError::Options(_))
        ));
    }

    #[test]
    fn test_drop_releases_acquired_region() {
        let cloud = Arc::new(MockCloudInfo::with_versions(&[]));
        let opts = options(cloud.clone()).default_with_vars().unwrap();
        assert_eq!(cloud.regions().usage("us-south"), 1);

        drop(opts);
        assert_eq!(cloud.regions().usage("us-south"), 0);
    }

    #[tokio::test]
    async fn test_ingress_failure_recorded_as_soft_assertion() {
        let cloud = Arc::new(MockCloudInfo::with_versions(&[]).with_ingress(&["critical"]));
        let mut opts = options(cloud);
        opts.ingress_poll = PollSchedule {
            timeout: Duration::from_millis(20),
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
        };

        assert!(!opts.check_cluster_ingress_healthy_default_timeout("c1").await);
        let failures = opts.assertions.failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("critical"));
    }

    #[tokio::test]
    async fn test_last_apply_outputs_requires_run() {
        let cloud = Arc::new(MockCloudInfo::with_versions(&[]));
        let opts = options(cloud);
        assert!(matches!(
            opts.last_apply_outputs().await,
            Err(RunError::Options(_))
        ));
    }

    #[test]
    fn test_debug_omits_hook_body() {
        let cloud = Arc::new(MockCloudInfo::with_versions(&[]));
        let text = format!("{:?}", options(cloud));
        assert!(text.contains("base-iks"));
        assert!(text.contains("post_apply_hook: false"));
    }
}
