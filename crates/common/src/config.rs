//! Harness configuration.
//!
//! Configuration is loaded from environment variables with defaults that
//! match the layout of the Terraform module repository. Relative paths are
//! resolved against the module root, which defaults to a directory supplied
//! by the caller rather than the working directory.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Resource group shared by every scenario.
pub const DEFAULT_RESOURCE_GROUP: &str = "geretain-test-resources";

/// Permanent resources file, relative to the module root.
pub const DEFAULT_PERMANENT_RESOURCES_PATH: &str =
    "common-dev-assets/common-go-assets/common-permanent-resources.yaml";

/// API key reset script, relative to the module root.
pub const DEFAULT_APIKEY_RESET_SCRIPT: &str =
    "common-dev-assets/scripts/iks-api-key-reset/reset_iks_api_key.sh";

/// Environment variable holding the cloud API key.
pub const DEFAULT_API_KEY_VAR: &str = "TF_VAR_ibmcloud_api_key";

/// Environment variable the API key is re-exported under for downstream tooling.
pub const DEFAULT_EXPORTED_API_KEY_VAR: &str = "IBMCLOUD_API_KEY";

/// IAM token endpoint base URL.
pub const DEFAULT_IAM_ENDPOINT: &str = "https://iam.cloud.ibm.com";

/// Kubernetes service API base URL.
pub const DEFAULT_CONTAINERS_ENDPOINT: &str = "https://containers.cloud.ibm.com";

/// Git ref the upgrade scenario applies before switching to the current code.
pub const DEFAULT_UPGRADE_BASE_REF: &str = "origin/main";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Harness configuration.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Root of the Terraform module under test (`IKS_MODULE_ROOT`).
    pub module_root: PathBuf,

    /// Existing resource group used by every scenario (`IKS_TEST_RESOURCE_GROUP`).
    pub resource_group: String,

    /// Permanent resources YAML (`IKS_PERMANENT_RESOURCES_FILE`).
    pub permanent_resources_path: PathBuf,

    /// Optional region preference YAML (`IKS_REGION_PREFS_FILE`).
    pub region_prefs_path: Option<PathBuf>,

    /// Script that resets the containers API key (`IKS_APIKEY_RESET_SCRIPT`).
    pub apikey_reset_script: PathBuf,

    /// Variable holding the cloud API key.
    pub api_key_var: String,

    /// Variable the API key is exported under before running the reset script.
    pub exported_api_key_var: String,

    /// IAM endpoint (`IBMCLOUD_IAM_ENDPOINT`).
    pub iam_endpoint: String,

    /// Kubernetes service endpoint (`IBMCLOUD_CONTAINERS_ENDPOINT`).
    pub containers_endpoint: String,

    /// Base ref for upgrade runs (`UPGRADE_BASE_REF`).
    pub upgrade_base_ref: String,

    /// Leave infrastructure in place after every run (`SKIP_TEST_TEARDOWN`).
    pub skip_test_teardown: bool,

    /// Leave infrastructure in place after a failed run (`DO_NOT_DESTROY_ON_FAILURE`).
    pub do_not_destroy_on_failure: bool,
}

impl HarnessConfig {
    /// Load configuration from environment variables.
    ///
    /// `default_module_root` is used when `IKS_MODULE_ROOT` is unset.
    pub fn from_env(default_module_root: &Path) -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect(), default_module_root)
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(
        vars: &HashMap<String, String>,
        default_module_root: &Path,
    ) -> Result<Self, ConfigError> {
        let module_root = vars
            .get("IKS_MODULE_ROOT")
            .filter(|p| !p.is_empty())
            .map_or_else(|| default_module_root.to_path_buf(), PathBuf::from);

        let resource_group = vars
            .get("IKS_TEST_RESOURCE_GROUP")
            .cloned()
            .unwrap_or_else(|| DEFAULT_RESOURCE_GROUP.to_string());
        if resource_group.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "IKS_TEST_RESOURCE_GROUP must not be empty".to_string(),
            ));
        }

        let permanent_resources_path = resolve(
            &module_root,
            vars.get("IKS_PERMANENT_RESOURCES_FILE")
                .map_or(DEFAULT_PERMANENT_RESOURCES_PATH, String::as_str),
        );

        let region_prefs_path = vars
            .get("IKS_REGION_PREFS_FILE")
            .filter(|p| !p.is_empty())
            .map(|p| resolve(&module_root, p));

        let apikey_reset_script = resolve(
            &module_root,
            vars.get("IKS_APIKEY_RESET_SCRIPT")
                .map_or(DEFAULT_APIKEY_RESET_SCRIPT, String::as_str),
        );

        let iam_endpoint = endpoint(vars, "IBMCLOUD_IAM_ENDPOINT", DEFAULT_IAM_ENDPOINT)?;
        let containers_endpoint = endpoint(
            vars,
            "IBMCLOUD_CONTAINERS_ENDPOINT",
            DEFAULT_CONTAINERS_ENDPOINT,
        )?;

        let upgrade_base_ref = vars
            .get("UPGRADE_BASE_REF")
            .filter(|r| !r.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_UPGRADE_BASE_REF.to_string());

        Ok(Self {
            module_root,
            resource_group,
            permanent_resources_path,
            region_prefs_path,
            apikey_reset_script,
            api_key_var: DEFAULT_API_KEY_VAR.to_string(),
            exported_api_key_var: DEFAULT_EXPORTED_API_KEY_VAR.to_string(),
            iam_endpoint,
            containers_endpoint,
            upgrade_base_ref,
            skip_test_teardown: parse_bool(vars, "SKIP_TEST_TEARDOWN")?,
            do_not_destroy_on_failure: parse_bool(vars, "DO_NOT_DESTROY_ON_FAILURE")?,
        })
    }
}

fn resolve(module_root: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        module_root.join(path)
    }
}

fn endpoint(
    vars: &HashMap<String, String>,
    name: &str,
    default: &str,
) -> Result<String, ConfigError> {
    let value = vars.get(name).map_or(default, String::as_str);
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::InvalidValue(format!(
            "{name} must be an http(s) URL, got '{value}'"
        )));
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn parse_bool(vars: &HashMap<String, String>, name: &str) -> Result<bool, ConfigError> {
    match vars.get(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if v.is_empty() || v == "false" || v == "0" => Ok(false),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) => Err(ConfigError::InvalidValue(format!(
            "{name} must be true or false, got '{v}'"
        ))),
    }
}
