//! One reconcile pass: publish PowerDNS keys at the registrar for every
//! zone that is not signed yet.

use anyhow::{Context, Result};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{ReconcileConfig, SyncConfig};
use crate::powerdns::{CryptoKey, PowerDnsClient};
use crate::registrar::commands::{
    first_nameserver, has_dnssec_keys, modify_domain_dnssec, retrieve_domain,
};
use crate::registrar::{
    ApiError, Codec, DnssecKey, DomainName, HttpTransport, Map, RegistrarClient,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The registrar does not manage the domain
    UnknownDomain,
    /// The domain delegates to someone else's nameservers
    ForeignNameservers,
    /// The registrar already holds DNSSEC keys for the domain
    AlreadySigned,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::UnknownDomain => "domain not present at the registrar",
            SkipReason::ForeignNameservers => "domain not using our nameservers",
            SkipReason::AlreadySigned => "domain is already using DNSSEC",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneOutcome {
    Registered,
    Skipped(SkipReason),
    Failed(String),
}

impl fmt::Display for ZoneOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneOutcome::Registered => f.write_str("registered"),
            ZoneOutcome::Skipped(reason) => write!(f, "skipped ({})", reason),
            ZoneOutcome::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// Outcome of every zone visited in one pass, in visiting order
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub outcomes: Vec<(String, ZoneOutcome)>,
}

impl ReconcileReport {
    pub fn push(&mut self, zone: impl Into<String>, outcome: ZoneOutcome) {
        self.outcomes.push((zone.into(), outcome));
    }

    pub fn registered(&self) -> usize {
        self.count(|o| matches!(o, ZoneOutcome::Registered))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ZoneOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ZoneOutcome::Failed(_)))
    }

    pub fn outcome(&self, zone: &str) -> Option<&ZoneOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == zone)
            .map(|(_, outcome)| outcome)
    }

    fn count(&self, pred: impl Fn(&ZoneOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

pub struct Reconciler {
    registrar: RegistrarClient,
    powerdns: PowerDnsClient,
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(registrar: RegistrarClient, powerdns: PowerDnsClient, config: ReconcileConfig) -> Self {
        Self {
            registrar,
            powerdns,
            config,
        }
    }

    /// Build both API clients from a loaded configuration
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.registrar.transport_config())
            .context("Failed to set up registrar transport")?;
        let codec = Codec::new(config.registrar.codec_config()?);
        let registrar = RegistrarClient::new(transport, codec, config.registrar.credentials());
        let powerdns = PowerDnsClient::new(&config.powerdns)?;

        Ok(Self::new(registrar, powerdns, config.reconcile.clone()))
    }

    /// Visit every unsigned zone once.
    ///
    /// A failing zone is recorded and the pass moves on; registrar
    /// maintenance ends the pass with an error.
    pub async fn run(&self) -> Result<ReconcileReport> {
        let zones = self.powerdns.zones_without_dnssec().await?;
        let mut report = ReconcileReport::default();

        for zone in zones {
            if self.config.sleep_secs > 0 {
                tokio::time::sleep(Duration::from_secs(self.config.sleep_secs)).await;
            }

            let outcome = match self.reconcile_zone(&zone).await {
                Ok(outcome) => outcome,
                Err(e) if is_maintenance(&e) => {
                    return Err(e.context(format!(
                        "Registrar in maintenance while processing {}, aborting pass",
                        zone
                    )));
                }
                Err(e) => ZoneOutcome::Failed(format!("{:#}", e)),
            };

            match &outcome {
                ZoneOutcome::Registered => info!("DNSSEC OK: {}", zone),
                ZoneOutcome::Skipped(reason) => {
                    info!("DNSSEC skipped for domain: {} ({})", zone, reason)
                }
                ZoneOutcome::Failed(reason) => {
                    warn!("DNSSEC failed for domain: {} ({})", zone, reason)
                }
            }
            report.push(zone, outcome);
        }

        Ok(report)
    }

    /// Bring one zone's registrar keys in line with PowerDNS
    pub async fn reconcile_zone(&self, zone: &str) -> Result<ZoneOutcome> {
        let domain = DomainName::parse(zone)?;

        let Some(data) = retrieve_domain(&self.registrar, &domain).await? else {
            return Ok(ZoneOutcome::Skipped(SkipReason::UnknownDomain));
        };
        if !self.uses_our_nameservers(&data) {
            return Ok(ZoneOutcome::Skipped(SkipReason::ForeignNameservers));
        }
        if has_dnssec_keys(&data) {
            return Ok(ZoneOutcome::Skipped(SkipReason::AlreadySigned));
        }

        let mut keys = self.powerdns.cryptokeys(zone).await?;

        // A leading ZSK would get published as the registrar's key
        let mut purged = 0;
        while let Some(id) = keys.first().filter(|k| k.is_zsk()).map(|k| k.id) {
            if purged >= self.config.max_purge_attempts {
                return Ok(ZoneOutcome::Failed(format!(
                    "zone signing key still first after {} deletions",
                    purged
                )));
            }
            self.powerdns.delete_cryptokey(zone, id).await?;
            purged += 1;
            keys = self.powerdns.cryptokeys(zone).await?;
        }

        if keys.is_empty() {
            if !self.powerdns.enable_dnssec(zone).await? {
                return Ok(ZoneOutcome::Failed("failed to create keys".to_string()));
            }
            keys = self.powerdns.cryptokeys(zone).await?;
        }

        let Some(key) = keys.first() else {
            return Ok(ZoneOutcome::Failed(
                "no active key after enabling DNSSEC".to_string(),
            ));
        };

        let key = registrar_key(key)?;
        if modify_domain_dnssec(&self.registrar, &domain, &key).await? {
            Ok(ZoneOutcome::Registered)
        } else {
            Ok(ZoneOutcome::Failed("failed to set keys".to_string()))
        }
    }

    fn uses_our_nameservers(&self, data: &Map) -> bool {
        first_nameserver(data).is_some_and(|ns| is_listed(ns, &self.config.nameservers))
    }
}

fn is_listed(nameserver: &str, ours: &[String]) -> bool {
    let nameserver = nameserver.trim().trim_end_matches('.');
    ours.iter().any(|ns| ns.eq_ignore_ascii_case(nameserver))
}

fn registrar_key(key: &CryptoKey) -> Result<DnssecKey> {
    let fields = key.dnskey_fields()?;
    Ok(DnssecKey {
        flags: key.flags.unwrap_or(fields.flags),
        algorithm: fields.algorithm,
        public_key: fields.public_key,
    })
}

fn is_maintenance(e: &anyhow::Error) -> bool {
    e.downcast_ref::<ApiError>()
        .is_some_and(ApiError::is_maintenance)
}
