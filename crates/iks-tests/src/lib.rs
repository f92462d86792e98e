//! IKS Module Example Tests
//!
//! Live tests for the IKS VPC Terraform module. Each scenario deploys one of
//! the module examples into a real account, checks that a re-plan is clean
//! (or that an upgrade from the base ref destroys nothing) and tears the
//! deployment down again.
//!
//! # Features
//!
//! - `pr`: advanced and upgrade scenarios, run in the PR pipeline
//! - `other`: basic scenario, run only in continuous testing
//! - `all`: Enable all test categories
//!
//! # Prerequisites
//!
//! 1. `TF_VAR_ibmcloud_api_key` set to an API key for the test account
//! 2. `terraform`, `git` and `bash` in PATH
//! 3. The `common-dev-assets` submodule checked out (permanent resources
//!    file and API key reset script)
//!
//! # Usage
//!
//! ```bash
//! # From the tests directory - runs no scenarios (no default features)
//! cargo test
//!
//! # PR pipeline
//! cargo test -p iks-tests --features pr
//!
//! # Everything, keeping resources of failed runs
//! DO_NOT_DESTROY_ON_FAILURE=true cargo test -p iks-tests --features all
//! ```

pub mod apikey;
pub mod env;
pub mod hooks;
pub mod options;
pub mod scenarios;
pub mod setup;
pub mod versions;

use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "iks_tests=info,testhelper=info,cloudinfo=info";

static TRACING: Once = Once::new();

/// Install the log subscriber for the test binary, once.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}
