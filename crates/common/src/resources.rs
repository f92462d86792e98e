//! Permanent resources map.
//!
//! A fixed set of pre-existing cloud resources (access tags, shared
//! secrets managers, key protect instances, ...) is described in a YAML
//! file kept alongside the module. The map is loaded once during setup
//! and shared read-only by every scenario.

use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Key holding the access tags applied to every provisioned cluster.
pub const ACCESS_TAGS_KEY: &str = "accessTags";

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Failed to read permanent resources file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse permanent resources file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Permanent resource '{key}' cannot be converted to JSON: {source}")]
    Conversion {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Read-only key/value map of permanent test resources.
#[derive(Debug, Clone, Default)]
pub struct PermanentResources {
    values: BTreeMap<String, Value>,
}

impl PermanentResources {
    /// Load the map from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ResourceError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ResourceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let values: BTreeMap<String, Value> =
            serde_yaml::from_str(&contents).map_err(|source| ResourceError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(
            target: "common.resources",
            path = %path.display(),
            entries = values.len(),
            "Loaded permanent resources"
        );

        Ok(Self { values })
    }

    /// Build the map from already-parsed values.
    #[must_use]
    pub fn from_values(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    /// Look up a raw YAML value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Look up a value converted to JSON, ready to hand to Terraform.
    ///
    /// Missing keys map to `Value::Null`, which Terraform treats as "unset".
    pub fn get_json(&self, key: &str) -> Result<serde_json::Value, ResourceError> {
        match self.values.get(key) {
            Some(value) => serde_json::to_value(value).map_err(|source| ResourceError::Conversion {
                key: key.to_string(),
                source,
            }),
            None => Ok(serde_json::Value::Null),
        }
    }

    /// Access tags applied to provisioned resources.
    pub fn access_tags(&self) -> Result<serde_json::Value, ResourceError> {
        self.get_json(ACCESS_TAGS_KEY)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
accessTags:
  - "geretain-dev:permanent"
  - "env:test"
secretsManagerGuid: "79c6d411-2e4d-4a4f-8b6b-9a4a1f1e2a3b"
hpcs_crn: "crn:v1:bluemix:public:hs-crypto:us-south:a/abc::"
"#;

    fn write_sample(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_parses_map() {
        let file = write_sample(SAMPLE);
        let resources = PermanentResources::load(file.path()).unwrap();

        assert_eq!(resources.len(), 3);
        assert!(resources.get("secretsManagerGuid").is_some());
        assert!(resources.get("missing").is_none());
    }

    #[test]
    fn test_access_tags_as_json() {
        let file = write_sample(SAMPLE);
        let resources = PermanentResources::load(file.path()).unwrap();

        let tags = resources.access_tags().unwrap();
        assert_eq!(
            tags,
            serde_json::json!(["geretain-dev:permanent", "env:test"])
        );
    }

    #[test]
    fn test_missing_key_is_null() {
        let resources = PermanentResources::default();
        assert!(resources.is_empty());
        assert_eq!(resources.access_tags().unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = PermanentResources::load("/nonexistent/permanent.yaml").unwrap_err();
        assert!(matches!(err, ResourceError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/permanent.yaml"));
    }

    #[test]
    fn test_load_non_map_fails() {
        let file = write_sample("- just\n- a\n- list\n");
        let err = PermanentResources::load(file.path()).unwrap_err();
        assert!(matches!(err, ResourceError::Parse { .. }));
    }
}
