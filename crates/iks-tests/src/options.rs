//! Scenario test options.

use crate::setup::TestContext;
use std::sync::Arc;
use testhelper::{Exemptions, RunError, TestOptions};

/// Example with the minimal cluster configuration.
pub const BASIC_EXAMPLE_DIR: &str = "examples/basic";

/// Example exercising workload pools, logging agents and access tags.
pub const ADVANCED_EXAMPLE_DIR: &str = "examples/advanced";

/// Resources whose in-place updates are expected on every re-plan.
pub const IGNORE_UPDATES: &[&str] = &["module.logs_agents.helm_release.logs_agent"];

/// Options for one scenario: `prefix` and `terraform_dir` name the run,
/// `kube_version` is the cluster version under test.
pub fn setup_options(
    ctx: &TestContext,
    prefix: &str,
    terraform_dir: &str,
    kube_version: &str,
) -> Result<TestOptions, RunError> {
    let access_tags = ctx
        .permanent_resources
        .access_tags()
        .map_err(|e| RunError::Options(e.to_string()))?;

    let mut options = TestOptions::new(Arc::clone(&ctx.cloud_info));
    options.terraform_dir = terraform_dir.to_string();
    options.prefix = prefix.to_string();
    options.resource_group = Some(ctx.config.resource_group.clone());
    options.ignore_updates = Exemptions::new(IGNORE_UPDATES.iter().copied());
    options
        .terraform_vars
        .insert("kube_version".to_string(), serde_json::json!(kube_version));
    options
        .terraform_vars
        .insert("access_tags".to_string(), access_tags);
    options.check_apply_result_for_upgrade = true;

    options.module_root = ctx.config.module_root.clone();
    options.upgrade_base_ref = ctx.config.upgrade_base_ref.clone();
    options.skip_test_teardown = ctx.config.skip_test_teardown;
    options.do_not_destroy_on_failure = ctx.config.do_not_destroy_on_failure;

    options.default_with_vars()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::versions::IksVersions;
    use cloudinfo::mock::MockCloudInfo;
    use common::config::HarnessConfig;
    use common::resources::PermanentResources;
    use std::collections::{BTreeMap, HashMap};

    pub(crate) fn context(
        resources: BTreeMap<String, serde_yaml::Value>,
        cloud: Arc<MockCloudInfo>,
    ) -> TestContext {
        let config =
            HarnessConfig::from_vars(&HashMap::new(), &crate::setup::default_module_root())
                .unwrap();
        TestContext {
            config,
            cloud_info: cloud,
            permanent_resources: PermanentResources::from_values(resources),
            versions: IksVersions::from_available(&["1.31".to_string()]).unwrap(),
        }
    }

    fn tags() -> BTreeMap<String, serde_yaml::Value> {
        BTreeMap::from([(
            "accessTags".to_string(),
            serde_yaml::from_str("[geretain-dev:permanent]").unwrap(),
        )])
    }

    #[test]
    fn test_options_for_advanced() {
        let ctx = context(tags(), Arc::new(MockCloudInfo::with_versions(&[])));
        let options = setup_options(&ctx, "base-iks-adv", ADVANCED_EXAMPLE_DIR, "1.31").unwrap();

        assert!(options.prefix.starts_with("base-iks-adv-"));
        assert_eq!(options.terraform_dir, "examples/advanced");
        assert_eq!(
            options.resource_group.as_deref(),
            Some("geretain-test-resources")
        );
        assert!(options
            .ignore_updates
            .contains("module.logs_agents.helm_release.logs_agent"));
        assert!(options.check_apply_result_for_upgrade);
        assert_eq!(options.terraform_vars["kube_version"], "1.31");
        assert_eq!(
            options.terraform_vars["access_tags"],
            serde_json::json!(["geretain-dev:permanent"])
        );
        assert_eq!(options.terraform_vars["region"], "us-south");
    }

    #[test]
    fn test_missing_access_tags_become_null() {
        let ctx = context(BTreeMap::new(), Arc::new(MockCloudInfo::with_versions(&[])));
        let options = setup_options(&ctx, "base-iks", BASIC_EXAMPLE_DIR, "1.30").unwrap();

        assert_eq!(options.terraform_vars["access_tags"], serde_json::Value::Null);
    }
}
