use std::fmt::Display;

use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::UploaderError;

/// Plain-text IP echo endpoint.
pub const DEFAULT_ADDRESS_LOOKUP_URL: &str = "http://ifconfig.me/ip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAddress {
    pub host: String,
    pub port: u16,
}

impl NetworkAddress {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }
}

impl Display for NetworkAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Ask the echo service which address we are seen from.
///
/// The trimmed body is returned as-is; it is not checked to be an IP.
pub async fn resolve_public_address(
    client: &Client,
    lookup_url: &Url,
) -> Result<String, UploaderError> {
    debug!("Looking up public address via {}", lookup_url);

    let response = client
        .get(lookup_url.clone())
        .send()
        .await
        .map_err(|e| UploaderError::AddressLookup(format!("request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(UploaderError::AddressLookup(format!(
            "{} returned status {}",
            lookup_url, status
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| UploaderError::AddressLookup(format!("failed to read response: {}", e)))?;

    let address = body.trim();
    if address.is_empty() {
        return Err(UploaderError::AddressLookup(format!(
            "{} returned an empty body",
            lookup_url
        )));
    }

    Ok(address.to_string())
}
