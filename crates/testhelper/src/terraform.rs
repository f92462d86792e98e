//! Terraform command wrapper.
//!
//! Every command runs non-interactively in the run directory. Variables are
//! written once to a JSON var file so values such as lists of access tags
//! keep their types.

use crate::error::CommandError;
use crate::outputs::{parse_outputs, Outputs};
use crate::plan::Plan;
use crate::process;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, instrument};

/// Var file written into each run directory.
pub const VAR_FILE_NAME: &str = "harness.tfvars.json";

/// Plan file written by `plan`.
pub const PLAN_FILE_NAME: &str = "harness.tfplan";

/// Local state file name.
pub const STATE_FILE_NAME: &str = "terraform.tfstate";

/// Directory, variables and environment for Terraform commands.
#[derive(Debug, Clone)]
pub struct TerraformRun {
    pub dir: PathBuf,
    pub var_file: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl TerraformRun {
    /// Write the var file into `dir` and describe a run there.
    pub fn prepare(
        dir: impl Into<PathBuf>,
        vars: &BTreeMap<String, serde_json::Value>,
        env: BTreeMap<String, String>,
    ) -> Result<Self, CommandError> {
        let dir = dir.into();
        let var_file = dir.join(VAR_FILE_NAME);
        let contents = serde_json::to_vec_pretty(vars).map_err(|e| CommandError::InvalidOutput {
            command: "write var file".to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(&var_file, contents)?;

        Ok(Self { dir, var_file, env })
    }

    /// Local state file of this run.
    pub fn state_file(&self) -> PathBuf {
        self.dir.join(STATE_FILE_NAME)
    }
}

/// Terraform operations used by test runs (enables mocking).
#[async_trait::async_trait]
pub trait Terraform: Send + Sync + std::fmt::Debug {
    async fn init(&self, run: &TerraformRun) -> Result<(), CommandError>;

    async fn apply(&self, run: &TerraformRun) -> Result<(), CommandError>;

    /// Plan against current state and return the machine-readable plan.
    async fn plan(&self, run: &TerraformRun) -> Result<Plan, CommandError>;

    /// All root module outputs of the last apply.
    async fn output_all(&self, run: &TerraformRun) -> Result<Outputs, CommandError>;

    async fn destroy(&self, run: &TerraformRun) -> Result<(), CommandError>;
}

/// [`Terraform`] backed by the `terraform` binary.
#[derive(Debug, Clone)]
pub struct TerraformCli {
    binary: String,
}

impl Default for TerraformCli {
    fn default() -> Self {
        Self {
            binary: "terraform".to_string(),
        }
    }
}

impl TerraformCli {
    fn command(&self, run: &TerraformRun, args: &[&str]) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .current_dir(&run.dir)
            .env("TF_IN_AUTOMATION", "1")
            .envs(&run.env);
        command
    }

    fn var_file_arg(run: &TerraformRun) -> String {
        format!("-var-file={}", run.var_file.display())
    }
}

fn dir_label(dir: &Path) -> String {
    dir.display().to_string()
}

#[async_trait::async_trait]
impl Terraform for TerraformCli {
    #[instrument(skip_all, fields(dir = %dir_label(&run.dir)))]
    async fn init(&self, run: &TerraformRun) -> Result<(), CommandError> {
        info!(target: "testhelper.terraform", "terraform init");
        process::run(self.command(run, &["init", "-input=false", "-no-color", "-upgrade"])).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(dir = %dir_label(&run.dir)))]
    async fn apply(&self, run: &TerraformRun) -> Result<(), CommandError> {
        info!(target: "testhelper.terraform", "terraform apply");
        let var_file = Self::var_file_arg(run);
        process::run(self.command(
            run,
            &[
                "apply",
                "-input=false",
                "-no-color",
                "-auto-approve",
                "-lock=false",
                &var_file,
            ],
        ))
        .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(dir = %dir_label(&run.dir)))]
    async fn plan(&self, run: &TerraformRun) -> Result<Plan, CommandError> {
        info!(target: "testhelper.terraform", "terraform plan");
        let var_file = Self::var_file_arg(run);
        let out = format!("-out={PLAN_FILE_NAME}");
        process::run(self.command(
            run,
            &[
                "plan",
                "-input=false",
                "-no-color",
                "-lock=false",
                &out,
                &var_file,
            ],
        ))
        .await?;

        let json =
            process::run(self.command(run, &["show", "-json", "-no-color", PLAN_FILE_NAME])).await?;
        serde_json::from_str(&json).map_err(|e| CommandError::InvalidOutput {
            command: "terraform show -json".to_string(),
            message: e.to_string(),
        })
    }

    #[instrument(skip_all, fields(dir = %dir_label(&run.dir)))]
    async fn output_all(&self, run: &TerraformRun) -> Result<Outputs, CommandError> {
        let json = process::run(self.command(run, &["output", "-json", "-no-color"])).await?;
        parse_outputs(&json).map_err(|e| CommandError::InvalidOutput {
            command: "terraform output -json".to_string(),
            message: e.to_string(),
        })
    }

    #[instrument(skip_all, fields(dir = %dir_label(&run.dir)))]
    async fn destroy(&self, run: &TerraformRun) -> Result<(), CommandError> {
        info!(target: "testhelper.terraform", "terraform destroy");
        let var_file = Self::var_file_arg(run);
        process::run(self.command(
            run,
            &[
                "destroy",
                "-input=false",
                "-no-color",
                "-auto-approve",
                "-lock=false",
                &var_file,
            ],
        ))
        .await?;
        Ok(())
    }
}

/// Mock Terraform for unit testing.
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Mutex, PoisonError};

    /// One recorded call: operation name and run directory.
    pub type Call = (&'static str, PathBuf);

    /// Mock Terraform.
    ///
    /// Records every call. Plans are returned in sequence (empty plan once
    /// exhausted). An operation named in `failing` returns an error.
    /// `apply` writes a stub state file so state hand-over can be observed.
    #[derive(Debug, Default)]
    pub struct MockTerraform {
        calls: Mutex<Vec<Call>>,
        plans: Mutex<VecDeque<Plan>>,
        outputs: Outputs,
        failing: Option<&'static str>,
    }

    impl MockTerraform {
        /// Mock whose runs succeed with a clean plan and the given outputs.
        pub fn with_outputs(outputs: Outputs) -> Self {
            Self {
                outputs,
                ..Self::default()
            }
        }

        /// Queue plans returned by successive `plan` calls.
        #[must_use]
        pub fn with_plans(self, plans: Vec<Plan>) -> Self {
            *self.plans.lock().unwrap_or_else(PoisonError::into_inner) = plans.into();
            self
        }

        /// Make operation `op` (`init`, `apply`, `plan`, `output`, `destroy`) fail.
        #[must_use]
        pub fn failing_on(mut self, op: &'static str) -> Self {
            self.failing = Some(op);
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Names of the operations called, in order.
        pub fn operations(&self) -> Vec<&'static str> {
            self.calls().into_iter().map(|(op, _)| op).collect()
        }

        fn record(&self, op: &'static str, run: &TerraformRun) -> Result<(), CommandError> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((op, run.dir.clone()));
            if self.failing == Some(op) {
                return Err(CommandError::Failed {
                    command: format!("terraform {op}"),
                    status: "exit status: 1".to_string(),
                    stderr: format!("Error: mock {op} failure"),
                });
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl Terraform for MockTerraform {
        async fn init(&self, run: &TerraformRun) -> Result<(), CommandError> {
            self.record("init", run)
        }

        async fn apply(&self, run: &TerraformRun) -> Result<(), CommandError> {
            self.record("apply", run)?;
            std::fs::write(run.state_file(), b"{\"version\": 4}")?;
            Ok(())
        }

        async fn plan(&self, run: &TerraformRun) -> Result<Plan, CommandError> {
            self.record("plan", run)?;
            Ok(self
                .plans
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .unwrap_or_default())
        }

        async fn output_all(&self, run: &TerraformRun) -> Result<Outputs, CommandError> {
            self.record("output", run)?;
            Ok(self.outputs.clone())
        }

        async fn destroy(&self, run: &TerraformRun) -> Result<(), CommandError> {
            self.record("destroy", run)
        }
    }
}
