//! Secret types for protecting credentials from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for the cloud API key and the IAM
//! access tokens exchanged for it. `SecretString` implements `Debug` with
//! redaction, so any struct deriving `Debug` that holds one is safe to log
//! through `{:?}` or tracing fields.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Credentials {
//!     region: String,
//!     api_key: SecretString,
//! }
//!
//! let creds = Credentials {
//!     region: "us-south".to_string(),
//!     api_key: SecretString::from("abc123"),
//! };
//!
//! // Safe: api_key is redacted
//! println!("{:?}", creds);
//!
//! // The value is only reachable through an explicit call
//! let key: &str = creds.api_key.expose_secret();
//! # assert_eq!(key, "abc123");
//! ```
//!
//! Use `SecretString` for API keys, IAM bearer tokens, and anything passed
//! to child processes through the environment.

pub use secrecy::{ExposeSecret, SecretString};
