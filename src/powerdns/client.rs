use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::models::{CryptoKey, Zone};
use crate::config::PowerDnsConfig;

#[derive(Debug, Clone)]
pub struct PowerDnsClient {
    http_client: Client,
    /// `{url}/api/v1/servers/{server_id}`
    server_url: Url,
}

impl PowerDnsClient {
    pub fn new(config: &PowerDnsConfig) -> Result<Self> {
        let mut api_key = HeaderValue::from_str(&config.api_key)
            .context("PowerDNS API key is not a valid header value")?;
        api_key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("X-API-Key", api_key);

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("dnssec-sync/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        let mut server_url = Url::parse(&config.url)
            .with_context(|| format!("Invalid PowerDNS URL: {}", config.url))?;
        server_url
            .path_segments_mut()
            .map_err(|_| anyhow::anyhow!("PowerDNS URL cannot be a base: {}", config.url))?
            .pop_if_empty()
            .extend(["api", "v1", "servers", config.server_id.as_str()]);

        Ok(Self {
            http_client,
            server_url,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.server_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("PowerDNS URL cannot be a base"))?
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let url = self.url(segments)?;
        debug!("PowerDNS {} {}", method, url);
        Ok(self.http_client.request(method, url))
    }

    /// Names of zones that explicitly report DNSSEC as off
    pub async fn zones_without_dnssec(&self) -> Result<Vec<String>> {
        let zones: Vec<Zone> = self
            .request(Method::GET, &["zones"])?
            .send()
            .await
            .context("Failed to list PowerDNS zones")?
            .error_for_status()
            .context("PowerDNS rejected zone listing")?
            .json()
            .await
            .context("Failed to parse zone listing")?;

        let unsigned: Vec<String> = zones
            .iter()
            .filter(|zone| zone.dnssec_disabled())
            .map(|zone| zone.domain().to_string())
            .collect();

        info!(
            "PowerDNS lists {} zones, {} without DNSSEC",
            zones.len(),
            unsigned.len()
        );
        Ok(unsigned)
    }

    /// Cryptokeys of `zone`, or nothing unless the first key is active
    pub async fn cryptokeys(&self, zone: &str) -> Result<Vec<CryptoKey>> {
        let keys: Vec<CryptoKey> = self
            .request(Method::GET, &["zones", zone, "cryptokeys"])?
            .send()
            .await
            .with_context(|| format!("Failed to list cryptokeys of {}", zone))?
            .error_for_status()
            .with_context(|| format!("PowerDNS rejected cryptokey listing of {}", zone))?
            .json()
            .await
            .with_context(|| format!("Failed to parse cryptokeys of {}", zone))?;

        match keys.first() {
            Some(first) if first.active => Ok(keys),
            _ => {
                debug!("{} has no active leading cryptokey", zone);
                Ok(Vec::new())
            }
        }
    }

    pub async fn delete_cryptokey(&self, zone: &str, id: u64) -> Result<()> {
        let id = id.to_string();
        self.request(Method::DELETE, &["zones", zone, "cryptokeys", id.as_str()])?
            .send()
            .await
            .with_context(|| format!("Failed to delete cryptokey {} of {}", id, zone))?
            .error_for_status()
            .with_context(|| format!("PowerDNS rejected deletion of cryptokey {} of {}", id, zone))?;

        info!("Deleted cryptokey {} of {}", id, zone);
        Ok(())
    }

    /// Switch DNSSEC on for `zone` so PowerDNS generates its keys.
    ///
    /// PowerDNS answers an accepted change with an empty body; anything
    /// else is reported as `false`.
    pub async fn enable_dnssec(&self, zone: &str) -> Result<bool> {
        let response = self
            .request(Method::PUT, &["zones", zone])?
            .json(&serde_json::json!({ "dnssec": true }))
            .send()
            .await
            .with_context(|| format!("Failed to enable DNSSEC on {}", zone))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read DNSSEC change reply for {}", zone))?;

        if status.is_success() && body.trim().is_empty() {
            info!("Enabled DNSSEC on {}", zone);
            Ok(true)
        } else {
            warn!(
                "PowerDNS refused to enable DNSSEC on {} (HTTP {}): {}",
                zone,
                status.as_u16(),
                body.trim()
            );
            Ok(false)
        }
    }
}
