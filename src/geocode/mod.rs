//! Reverse geocoding against a Nominatim-compatible provider.
//!
//! Third-party boundary: requests never carry dashboard credentials, and
//! the timeout is tighter than the API client's.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::{Error, Result};

const GEOCODE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    display_name: String,
}

#[derive(Debug, Clone)]
pub struct Geocoder {
    base_url: String,
    http: Client,
}

impl Geocoder {
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config.geocoder_url.trim_end_matches('/').to_string();
        // Nominatim's usage policy wants an identifying user agent.
        let http = Client::builder()
            .timeout(GEOCODE_TIMEOUT)
            .user_agent(concat!("opsboard/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { base_url, http })
    }

    /// Formatted address for a coordinate pair.
    pub async fn reverse(&self, lat: f64, lon: f64) -> Result<String> {
        let url = format!(
            "{}/reverse?lat={lat}&lon={lon}&format=jsonv2",
            self.base_url
        );

        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::from_status(status.as_u16(), body));
        }

        let reverse: ReverseResponse = resp.json().await?;
        debug!(lat, lon, address = %reverse.display_name, "reverse geocoded");
        Ok(reverse.display_name)
    }
}
