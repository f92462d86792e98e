//! Kubernetes service API key refresh.
//!
//! The containers API key stored for a region and resource group can go
//! stale between runs. The reset script recreates it before a scenario
//! touches the cluster.

use crate::env::validate_env_variable;
use common::config::HarnessConfig;
use common::secret::{ExposeSecret, SecretString};
use std::path::PathBuf;
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info, instrument};

#[derive(Debug, Error)]
pub enum ApiKeyError {
    #[error("Failed to execute script {script}: {source}")]
    Spawn {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to execute script {script}: {status}\nStderr: {stderr}")]
    Failed {
        script: PathBuf,
        status: String,
        stderr: String,
    },
}

/// Run the reset script for `region` and `resource_group` with the API key
/// exported to it, printing the script's output.
///
/// Returns the API key, which Terraform also needs under
/// `exported_api_key_var`. The process environment is left untouched.
///
/// # Panics
///
/// Panics when the API key variable is unset or empty.
#[instrument(skip(config), fields(script = %config.apikey_reset_script.display()))]
pub async fn create_containers_apikey(
    config: &HarnessConfig,
    region: &str,
    resource_group: &str,
) -> Result<SecretString, ApiKeyError> {
    let api_key = SecretString::from(validate_env_variable(&config.api_key_var));

    let output = Command::new("bash")
        .arg(&config.apikey_reset_script)
        .arg(region)
        .arg(resource_group)
        .env(&config.exported_api_key_var, api_key.expose_secret())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ApiKeyError::Spawn {
            script: config.apikey_reset_script.clone(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        error!(
            target: "iks_tests.apikey",
            status = %output.status,
            "API key reset script failed"
        );
        return Err(ApiKeyError::Failed {
            script: config.apikey_reset_script.clone(),
            status: output.status.to_string(),
            stderr,
        });
    }

    info!(target: "iks_tests.apikey", "API key reset");
    println!("{}", String::from_utf8_lossy(&output.stdout));
    Ok(api_key)
}
