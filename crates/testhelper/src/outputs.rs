//! Terraform outputs.

use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Root module outputs by name.
pub type Outputs = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Deserialize)]
struct RawOutput {
    value: serde_json::Value,
}

/// Parse `terraform output -json`, keeping only the values.
pub fn parse_outputs(json: &str) -> Result<Outputs, serde_json::Error> {
    let raw: BTreeMap<String, RawOutput> = serde_json::from_str(json)?;
    Ok(raw.into_iter().map(|(k, v)| (k, v.value)).collect())
}

/// Expected outputs that are absent or null.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("missing or nil outputs: {}", .0.join(", "))]
pub struct MissingOutputs(pub Vec<String>);

/// Check that every key in `expected` is present with a non-null value.
pub fn validate_terraform_outputs(outputs: &Outputs, expected: &[&str]) -> Result<(), MissingOutputs> {
    let missing: Vec<String> = expected
        .iter()
        .filter(|key| outputs.get(**key).map_or(true, serde_json::Value::is_null))
        .map(|key| (*key).to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(MissingOutputs(missing))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_outputs_keeps_values() {
        let json = r#"{
            "cluster_name": {"sensitive": false, "type": "string", "value": "base-iks-adv-x1y2z3-cluster"},
            "workerpools": {"sensitive": false, "type": ["list", "string"], "value": ["default", "logging"]}
        }"#;

        let outputs = parse_outputs(json).unwrap();
        assert_eq!(outputs["cluster_name"], "base-iks-adv-x1y2z3-cluster");
        assert_eq!(outputs["workerpools"], serde_json::json!(["default", "logging"]));
    }

    #[test]
    fn test_parse_empty_outputs() {
        assert!(parse_outputs("{}").unwrap().is_empty());
    }

    #[test]
    fn test_validate_present() {
        let outputs = Outputs::from([("cluster_name".to_string(), serde_json::json!("c1"))]);
        assert!(validate_terraform_outputs(&outputs, &["cluster_name"]).is_ok());
    }

    #[test]
    fn test_validate_missing_and_null() {
        let outputs = Outputs::from([
            ("cluster_id".to_string(), serde_json::Value::Null),
            ("vpc_id".to_string(), serde_json::json!("r006-1")),
        ]);

        let err = validate_terraform_outputs(&outputs, &["cluster_name", "cluster_id", "vpc_id"])
            .unwrap_err();
        assert_eq!(
            err,
            MissingOutputs(vec!["cluster_name".to_string(), "cluster_id".to_string()])
        );
        assert_eq!(err.to_string(), "missing or nil outputs: cluster_name, cluster_id");
    }
}
