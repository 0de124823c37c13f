//! Provider configuration
//!
//! Connection settings for a CORTX S3 endpoint. Values come from the
//! environment (`CORTX_*`) and may be overridden by the caller.

use std::env;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::config::Credentials;
use thiserror::Error;

pub const ENV_ENDPOINT_HOST: &str = "CORTX_ENDPOINT_HOST";
pub const ENV_ENDPOINT_PORT: &str = "CORTX_ENDPOINT_PORT";
pub const ENV_REGION: &str = "CORTX_REGION";
pub const ENV_ACCESS_KEY: &str = "CORTX_ACCESS_KEY";
pub const ENV_SECRET_ACCESS_KEY: &str = "CORTX_SECRET_ACCESS_KEY";

pub const DEFAULT_ENDPOINT_PORT: &str = "80";
pub const DEFAULT_REGION: &str = "us-east-1";

/// Errors raised while building the provider configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error(
        "Unable to create CORTX S3 client - No Valid Credentials: \
         require cortx_access_key and cortx_secret_access_key"
    )]
    MissingCredentials,

    #[error("Invalid endpoint port: {0}")]
    InvalidPort(String),
}

/// Connection settings for a CORTX S3 server
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub endpoint_host: String,
    pub endpoint_port: String,
    pub region: String,
    pub access_key: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint_host", &self.endpoint_host)
            .field("endpoint_port", &self.endpoint_port)
            .field("region", &self.region)
            .field("access_key", &"<redacted>")
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint_host: String::new(),
            endpoint_port: DEFAULT_ENDPOINT_PORT.to_string(),
            region: DEFAULT_REGION.to_string(),
            access_key: String::new(),
            secret_access_key: String::new(),
        }
    }
}

impl ProviderConfig {
    /// Build a configuration from `CORTX_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            endpoint_host: lookup(ENV_ENDPOINT_HOST).unwrap_or(defaults.endpoint_host),
            endpoint_port: lookup(ENV_ENDPOINT_PORT).unwrap_or(defaults.endpoint_port),
            region: lookup(ENV_REGION).unwrap_or(defaults.region),
            access_key: lookup(ENV_ACCESS_KEY).unwrap_or(defaults.access_key),
            secret_access_key: lookup(ENV_SECRET_ACCESS_KEY).unwrap_or(defaults.secret_access_key),
        }
    }

    /// Check that everything needed to connect is present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint_host.is_empty() {
            return Err(ConfigError::Missing("cortx_endpoint_host"));
        }
        if self.endpoint_port.parse::<u16>().is_err() {
            return Err(ConfigError::InvalidPort(self.endpoint_port.clone()));
        }
        if self.access_key.is_empty() || self.secret_access_key.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }
        Ok(())
    }

    /// Endpoint URL; CORTX is reached over plain HTTP
    pub fn endpoint_url(&self) -> String {
        format!("http://{}:{}", self.endpoint_host, self.endpoint_port)
    }

    /// Load the shared SDK configuration with static credentials
    pub async fn load_sdk_config(&self) -> Result<SdkConfig, ConfigError> {
        self.validate()?;

        let credentials = Credentials::new(
            self.access_key.clone(),
            self.secret_access_key.clone(),
            None,
            None,
            "cortx-static",
        );

        Ok(aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(self.endpoint_url())
            .load()
            .await)
    }
}
