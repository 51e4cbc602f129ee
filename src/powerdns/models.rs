use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// DNSKEY flags value of a zone signing key
pub const ZSK_FLAGS: u16 = 256;

/// A zone as listed by `GET /servers/{id}/zones`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: Option<String>,
    /// Absent on servers that do not report it
    #[serde(default)]
    pub dnssec: Option<bool>,
}

impl Zone {
    /// Zone name without the trailing root dot
    pub fn domain(&self) -> &str {
        self.id.trim_end_matches('.')
    }

    /// True only when the server reports DNSSEC as explicitly off
    pub fn dnssec_disabled(&self) -> bool {
        self.dnssec == Some(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoKey {
    pub id: u64,
    #[serde(default)]
    pub keytype: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub published: Option<bool>,
    #[serde(default)]
    pub flags: Option<u16>,
    /// DNSKEY record in presentation format: `flags protocol algorithm key`
    #[serde(default)]
    pub dnskey: String,
    #[serde(default)]
    pub algorithm: Option<String>,
    #[serde(default)]
    pub bits: Option<u32>,
}

/// The four fields of a DNSKEY record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnskeyFields {
    pub flags: u16,
    pub protocol: u8,
    pub algorithm: u8,
    pub public_key: String,
}

impl CryptoKey {
    pub fn is_zsk(&self) -> bool {
        self.flags == Some(ZSK_FLAGS)
    }

    /// Split the DNSKEY presentation string into its fields.
    ///
    /// A public key broken into several whitespace-separated chunks is
    /// joined back together.
    pub fn dnskey_fields(&self) -> Result<DnskeyFields> {
        let mut parts = self.dnskey.split_whitespace();
        let mut next = |what: &str| {
            parts
                .next()
                .with_context(|| format!("DNSKEY of key {} has no {}", self.id, what))
        };

        let flags = next("flags")?
            .parse()
            .with_context(|| format!("Invalid flags in DNSKEY of key {}", self.id))?;
        let protocol = next("protocol")?
            .parse()
            .with_context(|| format!("Invalid protocol in DNSKEY of key {}", self.id))?;
        let algorithm = next("algorithm")?
            .parse()
            .with_context(|| format!("Invalid algorithm in DNSKEY of key {}", self.id))?;
        let public_key: String = parts.collect();
        if public_key.is_empty() {
            anyhow::bail!("DNSKEY of key {} has no public key", self.id);
        }

        Ok(DnskeyFields {
            flags,
            protocol,
            algorithm,
            public_key,
        })
    }
}
