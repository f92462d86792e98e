//! Required environment variables.

use std::collections::HashMap;
use std::env::VarError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("{0} environment variable not set")]
    NotSet(String),

    #[error("{0} environment variable is empty")]
    Empty(String),

    #[error("{0} environment variable is not valid unicode")]
    NotUnicode(String),
}

/// Value of `name` in `vars`, which must be present and non-empty.
pub fn lookup_env_variable(vars: &HashMap<String, String>, name: &str) -> Result<String, EnvError> {
    match vars.get(name) {
        None => Err(EnvError::NotSet(name.to_string())),
        Some(value) if value.is_empty() => Err(EnvError::Empty(name.to_string())),
        Some(value) => Ok(value.clone()),
    }
}

/// Value of the process environment variable `name`.
///
/// # Panics
///
/// Panics when the variable is unset or empty, failing the calling test.
pub fn validate_env_variable(name: &str) -> String {
    let error = match std::env::var(name) {
        Ok(value) if !value.is_empty() => return value,
        Ok(_) => EnvError::Empty(name.to_string()),
        Err(VarError::NotPresent) => EnvError::NotSet(name.to_string()),
        Err(VarError::NotUnicode(_)) => EnvError::NotUnicode(name.to_string()),
    };
    panic!("{error}")
}
