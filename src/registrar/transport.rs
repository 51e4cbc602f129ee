use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Certificate, Client};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::error::{ApiError, MaintenanceCause};

/// Which certificate authorities the transport trusts
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TlsTrust {
    /// Verify against the bundled web PKI roots
    #[default]
    SystemRoots,
    /// Verify against this PEM-encoded CA only, for endpoints with a
    /// private or self-signed certificate
    PinnedCa(PathBuf),
}

/// Settings for the registrar HTTPS transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Registrar API endpoint
    pub endpoint: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Reject endpoints that are not HTTPS
    pub require_https: bool,
    /// Certificate trust
    pub tls: TlsTrust,
    /// Maximum accepted response size in bytes
    pub max_response_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openprovider.eu".to_string(),
            timeout_secs: 30,
            require_https: true,
            tls: TlsTrust::SystemRoots,
            max_response_size: 10 * 1024 * 1024, // 10MB max
        }
    }
}

/// Posts one serialized request and returns the raw response body
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, ApiError> {
        let endpoint = validate_endpoint(&config.endpoint, config.require_https)?;

        let mut client_builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("dnssec-sync/", env!("CARGO_PKG_VERSION")));

        if config.require_https {
            client_builder = client_builder.https_only(true);
        }

        match &config.tls {
            TlsTrust::SystemRoots => {
                client_builder = client_builder.tls_built_in_root_certs(true);
            }
            TlsTrust::PinnedCa(path) => {
                let pem = std::fs::read(path).map_err(|e| {
                    ApiError::Config(format!("Cannot read CA file {}: {}", path.display(), e))
                })?;
                let cert = Certificate::from_pem(&pem).map_err(|e| {
                    ApiError::Config(format!("Invalid CA certificate {}: {}", path.display(), e))
                })?;
                client_builder = client_builder
                    .tls_built_in_root_certs(false)
                    .add_root_certificate(cert);
                info!("TLS trust pinned to CA {}", path.display());
            }
        }

        let client = client_builder
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// POST `payload` to the endpoint.
    ///
    /// Connection failures, timeouts, client-error statuses and empty or
    /// oversized bodies all come back as [`ApiError::BadReply`]. A
    /// server-error status whose body is not a registrar reply (a proxy's
    /// outage page, say) is [`ApiError::Maintenance`]; one that does carry
    /// a reply is returned for the envelope to parse.
    pub async fn send(&self, payload: &[u8]) -> Result<Vec<u8>, ApiError> {
        debug!("Posting {} bytes to {}", payload.len(), self.endpoint);

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "text/xml")
            .header(ACCEPT, "text/xml, application/xml")
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| {
                error!("HTTP error posting to {}: {}", self.endpoint, e);
                ApiError::BadReply(format!("request failed: {}", e))
            })?;

        let status = response.status();
        if status.is_client_error() || status.is_redirection() {
            error!("Registrar answered HTTP {}", status.as_u16());
            return Err(ApiError::BadReply(format!(
                "HTTP request failed with status {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let content_length = response.content_length().unwrap_or(0);
        if content_length > self.config.max_response_size as u64 {
            return Err(ApiError::BadReply(format!(
                "Response too large: {} bytes (max: {})",
                content_length, self.config.max_response_size
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            error!("Failed to read response body from {}: {}", self.endpoint, e);
            ApiError::BadReply(format!("failed to read response body: {}", e))
        })?;

        if body.is_empty() {
            return Err(ApiError::BadReply(format!(
                "empty response body (HTTP {})",
                status.as_u16()
            )));
        }
        if body.len() > self.config.max_response_size {
            return Err(ApiError::BadReply(format!(
                "Response body too large: {} bytes (max: {})",
                body.len(),
                self.config.max_response_size
            )));
        }

        if !status.is_success() {
            if !carries_reply(&body) {
                warn!(
                    "Registrar answered HTTP {} without a reply document",
                    status.as_u16()
                );
                return Err(ApiError::Maintenance(MaintenanceCause::EmptyDocument));
            }
            warn!("Registrar answered HTTP {} with a reply document", status.as_u16());
        }

        debug!("Received {} bytes from {}", body.len(), self.endpoint);
        Ok(body.to_vec())
    }
}

fn carries_reply(body: &[u8]) -> bool {
    body.windows(REPLY_OPEN.len()).any(|w| w == REPLY_OPEN)
}

const REPLY_OPEN: &[u8] = b"<reply>";

/// Validate that an endpoint URL is usable for the registrar transport
pub fn validate_endpoint(endpoint: &str, require_https: bool) -> Result<Url, ApiError> {
    let parsed = Url::parse(endpoint)
        .map_err(|e| ApiError::Config(format!("Invalid endpoint URL {}: {}", endpoint, e)))?;

    if require_https && parsed.scheme() != "https" {
        return Err(ApiError::Config(format!(
            "HTTPS is required but endpoint uses {}: {}",
            parsed.scheme(),
            endpoint
        )));
    }

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::Config(format!(
            "Unsupported endpoint scheme {}: {}",
            parsed.scheme(),
            endpoint
        )));
    }

    if parsed.host_str().is_none() {
        return Err(ApiError::Config(format!(
            "Endpoint must have a valid host: {}",
            endpoint
        )));
    }

    Ok(parsed)
}
