//! Example scenarios.
//!
//! | Scenario | Prefix         | Example           | Version slot |
//! |----------|----------------|-------------------|--------------|
//! | basic    | `base-iks`     | examples/basic    | 2 and 3      |
//! | advanced | `base-iks-adv` | examples/advanced | 1            |
//! | upgrade  | `base-iks-upg` | examples/advanced | 0            |
//!
//! Each scenario builds its options, refreshes the containers API key, runs
//! the consistency or upgrade run and reports the soft assertions.

use crate::apikey::create_containers_apikey;
use crate::hooks::get_cluster_ingress;
use crate::options::{setup_options, ADVANCED_EXAMPLE_DIR, BASIC_EXAMPLE_DIR};
use crate::setup::{abort, TestContext};
use common::secret::ExposeSecret;
use std::fmt;
use testhelper::{post_apply_hook, TestOptions};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Basic,
    Advanced,
    Upgrade,
}

impl Scenario {
    pub fn prefix(self) -> &'static str {
        match self {
            Scenario::Basic => "base-iks",
            Scenario::Advanced => "base-iks-adv",
            Scenario::Upgrade => "base-iks-upg",
        }
    }

    pub fn terraform_dir(self) -> &'static str {
        match self {
            Scenario::Basic => BASIC_EXAMPLE_DIR,
            Scenario::Advanced | Scenario::Upgrade => ADVANCED_EXAMPLE_DIR,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scenario::Basic => "basic",
            Scenario::Advanced => "advanced",
            Scenario::Upgrade => "upgrade",
        };
        f.write_str(name)
    }
}

/// Result of a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioOutcome {
    Passed,
    Skipped(String),
    Failed(Vec<String>),
}

impl ScenarioOutcome {
    /// Merge sub-case outcomes: any failure fails, all skipped skips.
    pub fn combine(outcomes: impl IntoIterator<Item = ScenarioOutcome>) -> Self {
        let mut failures = Vec::new();
        let mut skipped = Vec::new();
        let mut any_passed = false;

        for outcome in outcomes {
            match outcome {
                ScenarioOutcome::Passed => any_passed = true,
                ScenarioOutcome::Skipped(reason) => skipped.push(reason),
                ScenarioOutcome::Failed(f) => failures.extend(f),
            }
        }

        if !failures.is_empty() {
            ScenarioOutcome::Failed(failures)
        } else if !any_passed && !skipped.is_empty() {
            ScenarioOutcome::Skipped(skipped.join("; "))
        } else {
            ScenarioOutcome::Passed
        }
    }

    /// Fail the calling test when the scenario failed.
    ///
    /// # Panics
    ///
    /// Panics listing the recorded failures.
    pub fn assert_passed(&self) {
        match self {
            ScenarioOutcome::Passed => {}
            ScenarioOutcome::Skipped(reason) => {
                info!(target: "iks_tests.scenarios", reason = %reason, "Scenario skipped");
            }
            ScenarioOutcome::Failed(failures) => panic!(
                "{} assertion(s) failed:\n  - {}",
                failures.len(),
                failures.join("\n  - ")
            ),
        }
    }
}

pub async fn run_basic(ctx: &TestContext) -> ScenarioOutcome {
    run_scenario_with(ctx, Scenario::Basic, &|_: &mut TestOptions| {}).await
}

pub async fn run_advanced(ctx: &TestContext) -> ScenarioOutcome {
    run_scenario_with(ctx, Scenario::Advanced, &|_: &mut TestOptions| {}).await
}

pub async fn run_upgrade(ctx: &TestContext) -> ScenarioOutcome {
    run_scenario_with(ctx, Scenario::Upgrade, &|_: &mut TestOptions| {}).await
}

/// Run `scenario`, letting `customize` adjust each sub-case's options after
/// they are built (e.g. to swap in mocks).
pub async fn run_scenario_with(
    ctx: &TestContext,
    scenario: Scenario,
    customize: &(dyn Fn(&mut TestOptions) + Sync),
) -> ScenarioOutcome {
    match scenario {
        Scenario::Basic => {
            let [first, second] = ctx.versions.basic();
            let (a, b) = tokio::join!(
                run_version(ctx, scenario, first, customize),
                run_version(ctx, scenario, second, customize),
            );
            ScenarioOutcome::combine([a, b])
        }
        Scenario::Advanced => {
            run_version(ctx, scenario, ctx.versions.advanced(), customize).await
        }
        Scenario::Upgrade => run_version(ctx, scenario, ctx.versions.upgrade(), customize).await,
    }
}

async fn run_version(
    ctx: &TestContext,
    scenario: Scenario,
    version: &str,
    customize: &(dyn Fn(&mut TestOptions) + Sync),
) -> ScenarioOutcome {
    info!(target: "iks_tests.scenarios", %scenario, version, "Starting scenario");

    let mut options = match setup_options(ctx, scenario.prefix(), scenario.terraform_dir(), version)
    {
        Ok(options) => options,
        Err(e) => {
            error!(target: "iks_tests.scenarios", %scenario, error = %e, "Failed to build options");
            return ScenarioOutcome::Failed(vec![format!("Failed to build test options: {e}")]);
        }
    };

    let region = options.region.clone().unwrap_or_default();
    let resource_group = options
        .resource_group
        .clone()
        .unwrap_or_else(|| ctx.config.resource_group.clone());
    let api_key = match create_containers_apikey(&ctx.config, &region, &resource_group).await {
        Ok(api_key) => api_key,
        Err(e) => abort(&e),
    };
    options.terraform_env.insert(
        ctx.config.exported_api_key_var.clone(),
        api_key.expose_secret().to_string(),
    );

    if scenario == Scenario::Advanced {
        options.post_apply_hook = Some(post_apply_hook(get_cluster_ingress));
    }
    customize(&mut options);

    let output = if scenario == Scenario::Upgrade {
        let result = options.run_test_upgrade().await;
        if options.upgrade_test_skipped {
            let reason = options
                .upgrade_skip_reason
                .clone()
                .unwrap_or_else(|| "upgrade test skipped".to_string());
            warn!(target: "iks_tests.scenarios", %scenario, reason = %reason, "Upgrade test skipped");
            return ScenarioOutcome::Skipped(reason);
        }
        result.map(Option::unwrap_or_default)
    } else {
        options.run_test_consistency().await
    };

    options
        .assertions
        .no_error(&output, "This should not have errored");
    options
        .assertions
        .is_some(output.as_ref().ok(), "Expected some output");

    let failures = options.assertions.failures();
    if failures.is_empty() {
        info!(target: "iks_tests.scenarios", %scenario, version, "Scenario passed");
        ScenarioOutcome::Passed
    } else {
        error!(
            target: "iks_tests.scenarios",
            %scenario,
            version,
            failures = failures.len(),
            "Scenario failed"
        );
        ScenarioOutcome::Failed(
            failures
                .into_iter()
                .map(|f| format!("[{scenario} {version}] {f}"))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::tests::context;
    use crate::versions::IksVersions;
    use cloudinfo::mock::MockCloudInfo;
    use serial_test::serial;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use testhelper::git::mock::MockSourceControl;
    use testhelper::terraform::mock::MockTerraform;
    use testhelper::Outputs;

    struct Fixture {
        _dir: tempfile::TempDir,
        module: std::path::PathBuf,
        ctx: TestContext,
    }

    fn fixture(versions: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let module = dir.path().join("module");
        for example in ["examples/basic", "examples/advanced"] {
            std::fs::create_dir_all(module.join(example)).unwrap();
        }
        let script = dir.path().join("reset.sh");
        std::fs::write(&script, "echo reset \"$1\" \"$2\"\n").unwrap();
        std::env::set_var("TF_VAR_ibmcloud_api_key", "test-key");

        let mut ctx = context(BTreeMap::new(), Arc::new(MockCloudInfo::with_versions(&[])));
        ctx.config.apikey_reset_script = script;
        ctx.versions = IksVersions::from_available(
            &versions.iter().map(|v| (*v).to_string()).collect::<Vec<_>>(),
        )
        .unwrap();

        Fixture {
            _dir: dir,
            module,
            ctx,
        }
    }

    fn outputs() -> Outputs {
        Outputs::from([("cluster_name".to_string(), serde_json::json!("c1"))])
    }

    #[test]
    fn test_combine() {
        use ScenarioOutcome::*;
        assert_eq!(ScenarioOutcome::combine([Passed, Passed]), Passed);
        assert_eq!(
            ScenarioOutcome::combine([Passed, Failed(vec!["x".to_string()])]),
            Failed(vec!["x".to_string()])
        );
        assert_eq!(
            ScenarioOutcome::combine([Skipped("a".to_string())]),
            Skipped("a".to_string())
        );
    }

    #[test]
    #[should_panic(expected = "1 assertion(s) failed")]
    fn test_assert_passed_panics_on_failure() {
        ScenarioOutcome::Failed(vec!["Expected some output".to_string()]).assert_passed();
    }

    #[tokio::test]
    #[serial]
    async fn test_basic_runs_both_versions() {
        let f = fixture(&["1.29", "1.30", "1.31", "1.32"]);
        let seen = Mutex::new(Vec::new());
        let module = f.module.clone();

        let outcome = run_scenario_with(&f.ctx, Scenario::Basic, &|options: &mut TestOptions| {
            seen.lock()
                .unwrap()
                .push(options.terraform_vars["kube_version"].clone());
            options.module_root = module.clone();
            options.terraform = Arc::new(MockTerraform::with_outputs(outputs()));
        })
        .await;

        assert_eq!(outcome, ScenarioOutcome::Passed);
        let mut seen = seen.into_inner().unwrap();
        seen.sort_by_key(ToString::to_string);
        assert_eq!(seen, vec![serde_json::json!("1.29"), serde_json::json!("1.30")]);
    }

    #[tokio::test]
    #[serial]
    async fn test_advanced_attaches_ingress_hook() {
        let f = fixture(&["1.31"]);
        let module = f.module.clone();
        let terraform = Arc::new(MockTerraform::with_outputs(outputs()));
        let tf = terraform.clone();

        let outcome = run_scenario_with(&f.ctx, Scenario::Advanced, &|options: &mut TestOptions| {
            assert!(options.post_apply_hook.is_some());
            assert_eq!(options.terraform_dir, "examples/advanced");
            assert_eq!(
                options.terraform_env.get("IBMCLOUD_API_KEY").map(String::as_str),
                Some("test-key")
            );
            options.module_root = module.clone();
            options.terraform = tf.clone();
        })
        .await;

        assert_eq!(outcome, ScenarioOutcome::Passed);
        assert_eq!(
            terraform.operations(),
            vec!["init", "apply", "output", "plan", "output", "destroy"]
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_failed_run_reports_assertions() {
        let f = fixture(&["1.31"]);
        let module = f.module.clone();

        let outcome = run_scenario_with(&f.ctx, Scenario::Advanced, &|options: &mut TestOptions| {
            options.module_root = module.clone();
            options.post_apply_hook = None;
            options.terraform = Arc::new(MockTerraform::default().failing_on("apply"));
        })
        .await;

        let ScenarioOutcome::Failed(failures) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(failures.len(), 2);
        assert!(failures[0].contains("This should not have errored"));
        assert!(failures[1].contains("Expected some output"));
    }

    #[tokio::test]
    #[serial]
    async fn test_upgrade_skipped_reports_skipped() {
        let f = fixture(&["1.31"]);
        let module = f.module.clone();
        let terraform = Arc::new(MockTerraform::default());
        let tf = terraform.clone();

        let outcome = run_scenario_with(&f.ctx, Scenario::Upgrade, &|options: &mut TestOptions| {
            options.module_root = module.clone();
            options.terraform = tf.clone();
            options.source_control = Arc::new(MockSourceControl::with_messages(
                "feat: rename\n\nBREAKING CHANGE: inputs renamed",
            ));
        })
        .await;

        assert!(matches!(outcome, ScenarioOutcome::Skipped(_)));
        assert!(terraform.operations().is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_upgrade_runs_on_newest_version() {
        let f = fixture(&["1.30", "1.31"]);
        let module = f.module.clone();
        let seen = Mutex::new(None);

        let outcome = run_scenario_with(&f.ctx, Scenario::Upgrade, &|options: &mut TestOptions| {
            *seen.lock().unwrap() = Some(options.terraform_vars["kube_version"].clone());
            assert!(options.prefix.starts_with("base-iks-upg-"));
            options.module_root = module.clone();
            options.terraform = Arc::new(MockTerraform::with_outputs(outputs()));
            options.source_control = Arc::new(MockSourceControl::with_messages("fix: bump"));
        })
        .await;

        assert_eq!(outcome, ScenarioOutcome::Passed);
        assert_eq!(seen.into_inner().unwrap(), Some(serde_json::json!("1.31")));
    }
}
