//! Cloud info service errors.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CloudInfoError {
    #[error("{0} environment variable not set")]
    ApiKeyNotSet(String),

    #[error("{0} environment variable is empty")]
    ApiKeyEmpty(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Authentication rejected by IAM: status {0}")]
    AuthenticationRejected(u16),

    #[error("Request to {url} failed with status {status}")]
    RequestFailed { url: String, status: u16 },

    #[error("Invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("No Kubernetes versions found for platform '{0}'")]
    UnknownPlatform(String),

    #[error("No regions are enabled for testing")]
    NoTestRegions,

    #[error("Failed to load region preferences from {path}: {message}")]
    RegionPrefs { path: PathBuf, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}
