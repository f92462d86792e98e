//! IAM access token exchange.
//!
//! The cloud API key is exchanged for a short-lived bearer token via the
//! `apikey` grant. Tokens are cached and reused until shortly before they
//! expire; parallel scenarios share one cache.

use crate::error::CloudInfoError;
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Grant type for exchanging an API key for an IAM token.
pub const APIKEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Refresh tokens this many seconds before they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct IamTokenResponse {
    access_token: SecretString,
    expires_in: i64,
}

#[derive(Debug)]
struct CachedToken {
    token: SecretString,
    expires_at: i64,
}

/// Cached IAM token source for one API key.
#[derive(Debug)]
pub struct IamTokenSource {
    endpoint: String,
    api_key: SecretString,
    cached: Mutex<Option<CachedToken>>,
}

impl IamTokenSource {
    pub fn new(endpoint: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            cached: Mutex::new(None),
        }
    }

    /// Return a valid bearer token, exchanging the API key when needed.
    pub async fn token(&self, http_client: &reqwest::Client) -> Result<SecretString, CloudInfoError> {
        let mut cached = self.cached.lock().await;

        let now = chrono::Utc::now().timestamp();
        if let Some(entry) = cached.as_ref() {
            if entry.expires_at - now > REFRESH_MARGIN_SECS {
                return Ok(entry.token.clone());
            }
        }

        let fresh = self.exchange(http_client).await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    #[instrument(skip_all)]
    async fn exchange(&self, http_client: &reqwest::Client) -> Result<CachedToken, CloudInfoError> {
        let url = format!("{}/identity/token", self.endpoint);

        debug!(target: "cloudinfo.iam", url = %url, "Requesting IAM token");

        let form_body = [
            ("grant_type", APIKEY_GRANT_TYPE),
            ("apikey", self.api_key.expose_secret()),
        ];

        let response = http_client
            .post(&url)
            .header("Accept", "application/json")
            .form(&form_body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 400 || status.as_u16() == 401 {
            warn!(target: "cloudinfo.iam", status = %status, "API key rejected by IAM");
            return Err(CloudInfoError::AuthenticationRejected(status.as_u16()));
        }
        if !status.is_success() {
            return Err(CloudInfoError::RequestFailed {
                url,
                status: status.as_u16(),
            });
        }

        let body: IamTokenResponse =
            response
                .json()
                .await
                .map_err(|e| CloudInfoError::InvalidResponse {
                    url: url.clone(),
                    message: e.to_string(),
                })?;

        debug!(
            target: "cloudinfo.iam",
            expires_in_secs = body.expires_in,
            "IAM token acquired"
        );

        Ok(CachedToken {
            token: body.access_token,
            expires_at: chrono::Utc::now().timestamp() + body.expires_in,
        })
    }
}
