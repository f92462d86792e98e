//! Terraform test execution.
//!
//! Runs a module example end to end and checks the result:
//!
//! - [`TestOptions::run_test_consistency`]: apply, post-apply hook, re-plan,
//!   fail on any non-exempt change, teardown
//! - [`TestOptions::run_test_upgrade`]: apply the base ref, move the state
//!   onto the current code, fail on destroys, teardown
//!
//! Terraform and git are reached through the [`Terraform`] and
//! [`SourceControl`] traits so runs can be exercised with the mocks in
//! [`terraform::mock`] and [`git::mock`].

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod assertions;
pub mod error;
pub mod git;
pub mod health;
pub mod options;
pub mod outputs;
pub mod plan;
mod process;
mod runner;
pub mod terraform;
pub mod workspace;

pub use assertions::SoftAssert;
pub use error::{CommandError, HealthError, RunError};
pub use git::{GitCli, SourceControl};
pub use health::{PollSchedule, DEFAULT_INGRESS_TIMEOUT};
pub use options::{post_apply_hook, HookFuture, PostApplyHook, TestOptions};
pub use outputs::{validate_terraform_outputs, MissingOutputs, Outputs};
pub use plan::{Exemptions, Plan, PlanExemptions};
pub use terraform::{Terraform, TerraformCli, TerraformRun};
