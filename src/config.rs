use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn};

use crate::registrar::{Charset, CodecConfig, Credentials, TlsTrust, TransportConfig};

/// Configuration for the DNSSEC sync
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Registrar XML API
    pub registrar: RegistrarConfig,
    /// PowerDNS HTTP API
    pub powerdns: PowerDnsConfig,
    /// Reconcile pass behaviour
    pub reconcile: ReconcileConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Clone)]
pub struct RegistrarConfig {
    /// API endpoint
    pub url: String,
    /// Reseller username
    pub username: String,
    /// Reseller password - MUST come from the environment
    pub password: String,
    /// Request timeout
    pub timeout_secs: u64,
    /// PEM CA to pin instead of the web PKI roots
    pub ca_file: Option<PathBuf>,
    /// Refuse plain HTTP endpoints
    pub require_https: bool,
    /// Charset label for outgoing documents
    pub charset: String,
}

#[derive(Clone)]
pub struct PowerDnsConfig {
    /// Base URL of the PowerDNS API, without the /api/v1 suffix
    pub url: String,
    /// X-API-Key value - MUST come from the environment
    pub api_key: String,
    /// PowerDNS server id
    pub server_id: String,
    /// Request timeout
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Pause before each zone
    pub sleep_secs: u64,
    /// Nameserver hostnames that mark a domain as ours
    pub nameservers: Vec<String>,
    /// How many leading ZSKs may be deleted per zone
    pub max_purge_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl fmt::Debug for RegistrarConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrarConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &mask_secret(&self.password))
            .field("timeout_secs", &self.timeout_secs)
            .field("ca_file", &self.ca_file)
            .field("require_https", &self.require_https)
            .field("charset", &self.charset)
            .finish()
    }
}

impl fmt::Debug for PowerDnsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowerDnsConfig")
            .field("url", &self.url)
            .field("api_key", &mask_secret(&self.api_key))
            .field("server_id", &self.server_id)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openprovider.eu".to_string(),
            username: "".to_string(),
            password: "".to_string(), // MUST be configured
            timeout_secs: 30,
            ca_file: None,
            require_https: true,
            charset: Charset::Utf8.label().to_string(),
        }
    }
}

impl Default for PowerDnsConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8081".to_string(),
            api_key: "".to_string(), // MUST be configured
            server_id: "localhost".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            sleep_secs: 1,
            nameservers: Vec::new(),
            max_purge_attempts: 10,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            registrar: RegistrarConfig::default(),
            powerdns: PowerDnsConfig::default(),
            reconcile: ReconcileConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup, e.g. a map in tests
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        // Registrar
        if let Some(url) = lookup("DNSSEC_SYNC_REGISTRAR_URL") {
            config.registrar.url = url;
        }
        config.registrar.username = lookup("DNSSEC_SYNC_REGISTRAR_USER")
            .context("DNSSEC_SYNC_REGISTRAR_USER environment variable is required")?;
        config.registrar.password = lookup("DNSSEC_SYNC_REGISTRAR_PASSWORD")
            .context("DNSSEC_SYNC_REGISTRAR_PASSWORD environment variable is required")?;
        if let Some(timeout) = lookup("DNSSEC_SYNC_REGISTRAR_TIMEOUT_SECS") {
            config.registrar.timeout_secs =
                parse_var(&timeout, "DNSSEC_SYNC_REGISTRAR_TIMEOUT_SECS")?;
        }
        if let Some(ca_file) = lookup("DNSSEC_SYNC_REGISTRAR_CA_FILE") {
            config.registrar.ca_file = Some(PathBuf::from(ca_file));
        }
        if let Some(require_https) = lookup("DNSSEC_SYNC_REQUIRE_HTTPS") {
            config.registrar.require_https =
                parse_var(&require_https, "DNSSEC_SYNC_REQUIRE_HTTPS")?;
        }
        if let Some(charset) = lookup("DNSSEC_SYNC_REGISTRAR_CHARSET") {
            config.registrar.charset = charset;
        }

        // PowerDNS
        if let Some(url) = lookup("DNSSEC_SYNC_POWERDNS_URL") {
            config.powerdns.url = url;
        }
        config.powerdns.api_key = lookup("DNSSEC_SYNC_POWERDNS_API_KEY")
            .context("DNSSEC_SYNC_POWERDNS_API_KEY environment variable is required")?;
        if let Some(server_id) = lookup("DNSSEC_SYNC_POWERDNS_SERVER_ID") {
            config.powerdns.server_id = server_id;
        }
        if let Some(timeout) = lookup("DNSSEC_SYNC_POWERDNS_TIMEOUT_SECS") {
            config.powerdns.timeout_secs =
                parse_var(&timeout, "DNSSEC_SYNC_POWERDNS_TIMEOUT_SECS")?;
        }

        // Reconcile
        if let Some(sleep) = lookup("DNSSEC_SYNC_SLEEP_SECS") {
            config.reconcile.sleep_secs = parse_var(&sleep, "DNSSEC_SYNC_SLEEP_SECS")?;
        }
        if let Some(nameservers) = lookup("DNSSEC_SYNC_NAMESERVERS") {
            config.reconcile.nameservers = nameservers
                .split(',')
                .map(|ns| ns.trim().trim_end_matches('.').to_lowercase())
                .filter(|ns| !ns.is_empty())
                .collect();
        }
        if let Some(attempts) = lookup("DNSSEC_SYNC_MAX_PURGE_ATTEMPTS") {
            config.reconcile.max_purge_attempts =
                parse_var(&attempts, "DNSSEC_SYNC_MAX_PURGE_ATTEMPTS")?;
        }

        if let Some(level) = lookup("DNSSEC_SYNC_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;

        info!(
            "Configuration loaded: registrar {} as {}, PowerDNS {} ({} nameservers)",
            config.registrar.url,
            config.registrar.username,
            config.powerdns.url,
            config.reconcile.nameservers.len()
        );

        Ok(config)
    }

    /// Validate configuration for security and consistency
    pub fn validate(&self) -> Result<()> {
        if self.registrar.username.is_empty() {
            return Err(anyhow::anyhow!("Registrar username cannot be empty"));
        }

        if self.registrar.password.is_empty() {
            return Err(anyhow::anyhow!("Registrar password cannot be empty"));
        }

        if self.registrar.require_https && !self.registrar.url.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "HTTPS is required but registrar URL is not HTTPS: {}",
                self.registrar.url
            ));
        }

        if Charset::from_label(&self.registrar.charset).is_none() {
            return Err(anyhow::anyhow!(
                "Unsupported registrar charset: {}",
                self.registrar.charset
            ));
        }

        if self.powerdns.api_key.is_empty() {
            return Err(anyhow::anyhow!("PowerDNS API key is required"));
        }

        if self.powerdns.server_id.is_empty() {
            return Err(anyhow::anyhow!("PowerDNS server id cannot be empty"));
        }

        if !self.powerdns.url.starts_with("https://") {
            warn!(
                "PowerDNS API is reached over plain HTTP: {}",
                self.powerdns.url
            );
        }

        if self.reconcile.nameservers.is_empty() {
            return Err(anyhow::anyhow!(
                "At least one nameserver must be configured (DNSSEC_SYNC_NAMESERVERS)"
            ));
        }

        if self.reconcile.max_purge_attempts == 0 {
            return Err(anyhow::anyhow!("Max purge attempts must be non-zero"));
        }

        Ok(())
    }
}

impl RegistrarConfig {
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            endpoint: self.url.clone(),
            timeout_secs: self.timeout_secs,
            require_https: self.require_https,
            tls: match &self.ca_file {
                Some(path) => TlsTrust::PinnedCa(path.clone()),
                None => TlsTrust::SystemRoots,
            },
            ..TransportConfig::default()
        }
    }

    pub fn codec_config(&self) -> Result<CodecConfig> {
        let charset = Charset::from_label(&self.charset)
            .with_context(|| format!("Unsupported registrar charset: {}", self.charset))?;
        Ok(CodecConfig {
            charset,
            ..CodecConfig::default()
        })
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.as_str(), self.password.as_str())
    }
}

fn parse_var<T>(value: &str, name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid {} value", name))
}

/// Mask a secret, keeping at most two characters at each end
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < 8 {
        return "***".to_string();
    }

    let keep = if chars.len() > 20 { 4 } else { 2 };
    let head: String = chars[..keep].iter().collect();
    let tail: String = chars[chars.len() - keep..].iter().collect();
    format!("{}***{}", head, tail)
}
