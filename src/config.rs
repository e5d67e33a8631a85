use std::time::Duration;

use crate::error::{Error, Result};

/// JWT template the identity provider mints API tokens from. Matches the
/// template configured on the issuer; see `TokenCache` for the lifetime
/// assumption tied to it.
pub const DEFAULT_TOKEN_TEMPLATE: &str = "ops-api";

const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration resolved from the environment.
///
/// Base URLs are optional at construction; operations that need one fail at
/// call time with a descriptive error instead of at startup, so an unset
/// geocoder or IdP does not break unrelated commands.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub idp_base_url: Option<String>,
    pub geocoder_url: String,
    pub token_template: String,
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            idp_base_url: None,
            geocoder_url: DEFAULT_GEOCODER_URL.to_string(),
            token_template: DEFAULT_TOKEN_TEMPLATE.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Environment variables:
    /// - `OPSBOARD_API_URL`: dashboard backend base URL
    /// - `OPSBOARD_IDP_URL`: identity provider base URL
    /// - `OPSBOARD_GEOCODER_URL`: reverse-geocoding base URL (defaults to Nominatim)
    /// - `OPSBOARD_TOKEN_TEMPLATE`: JWT template name (defaults to `ops-api`)
    /// - `OPSBOARD_HTTP_TIMEOUT_SECS`: request timeout (defaults to 30)
    pub fn from_env() -> Self {
        let timeout = std::env::var("OPSBOARD_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);

        Self {
            api_base_url: non_empty_var("OPSBOARD_API_URL"),
            idp_base_url: non_empty_var("OPSBOARD_IDP_URL"),
            geocoder_url: non_empty_var("OPSBOARD_GEOCODER_URL")
                .unwrap_or_else(|| DEFAULT_GEOCODER_URL.to_string()),
            token_template: non_empty_var("OPSBOARD_TOKEN_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_TOKEN_TEMPLATE.to_string()),
            http_timeout: Duration::from_secs(timeout),
        }
    }

    pub fn require_api_base(&self) -> Result<&str> {
        self.api_base_url
            .as_deref()
            .ok_or(Error::MissingConfig("OPSBOARD_API_URL is not set"))
    }

    pub fn require_idp_base(&self) -> Result<&str> {
        self.idp_base_url
            .as_deref()
            .ok_or(Error::MissingConfig("OPSBOARD_IDP_URL is not set"))
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}
