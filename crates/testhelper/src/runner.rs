//! Consistency and upgrade runs.
//!
//! A consistency run applies an example and re-plans it: a clean apply must
//! produce an empty plan. An upgrade run applies the example at the base
//! ref, moves the state onto the current code and checks that nothing is
//! destroyed or replaced.

use crate::error::RunError;
use crate::git::upgrade_skip_reason;
use crate::options::TestOptions;
use crate::outputs::Outputs;
use crate::plan::{check_consistency, check_upgrade};
use crate::terraform::TerraformRun;
use crate::workspace::WorkingCopy;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};

impl TestOptions {
    /// Apply the example, run the post-apply hook, re-plan and check that
    /// nothing non-exempt changes. Returns the outputs of the apply.
    ///
    /// The deployment is destroyed afterwards unless teardown is disabled.
    #[instrument(skip_all, fields(prefix = %self.prefix, dir = %self.terraform_dir))]
    pub async fn run_test_consistency(&mut self) -> Result<Outputs, RunError> {
        let result = self.consistency_in_copy().await;
        self.release_region();
        result
    }

    /// Upgrade from `upgrade_base_ref` to the current code.
    ///
    /// Returns `Ok(None)` when commit messages mark the change as breaking;
    /// `upgrade_test_skipped` is set in that case.
    #[instrument(skip_all, fields(prefix = %self.prefix, dir = %self.terraform_dir))]
    pub async fn run_test_upgrade(&mut self) -> Result<Option<Outputs>, RunError> {
        let messages = self
            .source_control
            .commit_messages_since(&self.module_root, &self.upgrade_base_ref)
            .await?;

        if let Some(reason) = upgrade_skip_reason(&messages) {
            info!(
                target: "testhelper.runner",
                base_ref = %self.upgrade_base_ref,
                reason = %reason,
                "Skipping upgrade test"
            );
            self.upgrade_test_skipped = true;
            self.upgrade_skip_reason = Some(reason);
            self.release_region();
            return Ok(None);
        }

        let result = self.upgrade_in_copies().await.map(Some);
        self.release_region();
        result
    }

    async fn consistency_in_copy(&mut self) -> Result<Outputs, RunError> {
        let mut copy = copy_module(&self.module_root, "consistency").await?;
        let run = self.prepare_run(copy.path())?;
        self.terraform_run = Some(run.clone());

        let result = self.consistency_steps(&run).await;
        match self.finish(&run, &result).await {
            Ok(true) => {}
            Ok(false) => copy.keep(),
            Err(e) => {
                copy.keep();
                return Err(e);
            }
        }
        result
    }

    async fn consistency_steps(&self, run: &TerraformRun) -> Result<Outputs, RunError> {
        self.terraform.init(run).await?;
        self.terraform.apply(run).await?;
        self.run_post_apply_hook().await?;
        self.check_plan_consistency(run).await?;
        Ok(self.terraform.output_all(run).await?)
    }

    async fn upgrade_in_copies(&mut self) -> Result<Outputs, RunError> {
        let mut current = copy_module(&self.module_root, "upgrade").await?;
        let current_run = self.prepare_run(current.path())?;

        let mut base = WorkingCopy::empty("upgrade-base").map_err(RunError::Workspace)?;
        let base_root = base.path().join("module");
        self.source_control
            .checkout(&self.module_root, &self.upgrade_base_ref, &base_root)
            .await?;

        let base_run = match self.prepare_run(&base_root) {
            Ok(run) => run,
            Err(e) => {
                self.remove_base_checkout(&base_root).await;
                return Err(e);
            }
        };
        self.terraform_run = Some(base_run.clone());

        let result = self.upgrade_steps(&base_run, &current_run).await;

        // Tear down wherever the state ended up.
        let state_run = self
            .terraform_run
            .clone()
            .unwrap_or_else(|| base_run.clone());
        let destroyed = match self.finish(&state_run, &result).await {
            Ok(destroyed) => destroyed,
            Err(e) => {
                current.keep();
                base.keep();
                return Err(e);
            }
        };

        let state_in_base = state_run.dir == base_run.dir;
        if !destroyed {
            current.keep();
            if state_in_base {
                base.keep();
            }
        }
        if destroyed || !state_in_base {
            self.remove_base_checkout(&base_root).await;
        }

        result
    }

    async fn remove_base_checkout(&self, base_root: &Path) {
        if let Err(e) = self
            .source_control
            .remove_checkout(&self.module_root, base_root)
            .await
        {
            warn!(
                target: "testhelper.runner",
                path = %base_root.display(),
                error = %e,
                "Failed to remove base checkout"
            );
        }
    }

    async fn upgrade_steps(
        &mut self,
        base: &TerraformRun,
        current: &TerraformRun,
    ) -> Result<Outputs, RunError> {
        info!(
            target: "testhelper.runner",
            base_ref = %self.upgrade_base_ref,
            "Applying base version"
        );
        self.terraform.init(base).await?;
        self.terraform.apply(base).await?;

        tokio::fs::copy(base.state_file(), current.state_file())
            .await
            .map_err(RunError::Workspace)?;
        self.terraform_run = Some(current.clone());

        info!(target: "testhelper.runner", "Planning upgrade to current code");
        self.terraform.init(current).await?;
        let plan = self.terraform.plan(current).await?;
        let destroys = check_upgrade(&plan, &self.exemptions());
        if !destroys.is_empty() {
            error!(
                target: "testhelper.runner",
                resources = ?destroys,
                "Upgrade would destroy resources"
            );
            return Err(RunError::UpgradeDestroys(destroys));
        }

        if self.check_apply_result_for_upgrade {
            info!(target: "testhelper.runner", "Applying current code over base state");
            self.terraform.apply(current).await?;
            self.run_post_apply_hook().await?;
            self.check_plan_consistency(current).await?;
        }

        Ok(self.terraform.output_all(current).await?)
    }

    async fn run_post_apply_hook(&self) -> Result<(), RunError> {
        let Some(hook) = self.post_apply_hook.clone() else {
            return Ok(());
        };
        info!(target: "testhelper.runner", "Running post-apply hook");
        hook(self)
            .await
            .map_err(|e| RunError::Hook(format!("{e:#}")))
    }

    async fn check_plan_consistency(&self, run: &TerraformRun) -> Result<(), RunError> {
        let plan = self.terraform.plan(run).await?;
        let changes = check_consistency(&plan, &self.exemptions());
        if changes.is_empty() {
            info!(target: "testhelper.runner", "Consistency check passed");
            Ok(())
        } else {
            error!(
                target: "testhelper.runner",
                resources = ?changes,
                "Consistency check failed"
            );
            Err(RunError::Inconsistent(changes))
        }
    }

    fn prepare_run(&self, root: &Path) -> Result<TerraformRun, RunError> {
        let dir = root.join(&self.terraform_dir);
        if !dir.is_dir() {
            return Err(RunError::Options(format!(
                "terraform dir '{}' not found under {}",
                self.terraform_dir,
                root.display()
            )));
        }
        Ok(TerraformRun::prepare(
            dir,
            &self.terraform_vars,
            self.terraform_env.clone(),
        )?)
    }

    /// Destroy the deployment unless teardown is disabled. Returns whether
    /// the deployment is gone.
    ///
    /// A destroy failure is returned only when the run itself succeeded.
    async fn finish<T>(
        &self,
        run: &TerraformRun,
        result: &Result<T, RunError>,
    ) -> Result<bool, RunError> {
        let failed = result.is_err();

        if self.skip_test_teardown {
            info!(
                target: "testhelper.runner",
                dir = %run.dir.display(),
                "Teardown skipped (SKIP_TEST_TEARDOWN)"
            );
            return Ok(false);
        }
        if failed && self.do_not_destroy_on_failure {
            warn!(
                target: "testhelper.runner",
                dir = %run.dir.display(),
                "Run failed, leaving resources in place (DO_NOT_DESTROY_ON_FAILURE)"
            );
            return Ok(false);
        }
        if !run.state_file().exists() {
            return Ok(true);
        }

        info!(target: "testhelper.runner", prefix = %self.prefix, "Tearing down");
        match self.terraform.destroy(run).await {
            Ok(()) => Ok(true),
            Err(e) if failed => {
                error!(
                    target: "testhelper.runner",
                    dir = %run.dir.display(),
                    error = %e,
                    "Teardown failed after failed run"
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Copy the module into a fresh working directory off the async runtime.
async fn copy_module(module_root: &Path, label: &'static str) -> Result<WorkingCopy, RunError> {
    let source: PathBuf = module_root.to_path_buf();
    tokio::task::spawn_blocking(move || WorkingCopy::copy_of(&source, label))
        .await
        .map_err(|e| RunError::Workspace(std::io::Error::other(e)))?
        .map_err(RunError::Workspace)
}
