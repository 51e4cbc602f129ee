//! Domain commands used by the DNSSEC sync

use std::fmt;

use tracing::{debug, info};

use super::client::RegistrarClient;
use super::error::ApiError;
use super::value::{Map, Value};

/// DNSKEY protocol field, fixed at 3 by RFC 4034
pub const DNSKEY_PROTOCOL: u8 = 3;

/// A domain split the way the registrar addresses it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainName {
    pub name: String,
    pub extension: String,
}

impl DomainName {
    /// Split at the first dot: `example.co.uk` is `example` + `co.uk`.
    pub fn parse(domain: &str) -> Result<Self, ApiError> {
        let domain = domain.trim().trim_end_matches('.');
        match domain.split_once('.') {
            Some((name, extension)) if !name.is_empty() && !extension.is_empty() => Ok(Self {
                name: name.to_string(),
                extension: extension.to_string(),
            }),
            _ => Err(ApiError::Format(format!(
                "domain {:?} has no registrable extension",
                domain
            ))),
        }
    }

    fn to_value(&self) -> Value {
        Map::new()
            .with("name", self.name.as_str())
            .with("extension", self.extension.as_str())
            .into()
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.extension)
    }
}

/// Key material published at the registrar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnssecKey {
    pub flags: u16,
    pub algorithm: u8,
    pub public_key: String,
}

impl DnssecKey {
    fn to_value(&self) -> Value {
        Map::new()
            .with("flags", self.flags)
            .with("alg", self.algorithm)
            .with("protocol", DNSKEY_PROTOCOL)
            .with("pubKey", self.public_key.trim())
            .into()
    }
}

/// Fetch the registrar's record for `domain`.
///
/// Returns `None` when the reply carries no nameserver, which is how the
/// registrar answers for domains it does not manage.
pub async fn retrieve_domain(
    client: &RegistrarClient,
    domain: &DomainName,
) -> Result<Option<Map>, ApiError> {
    let mut request = client.request("retrieveDomainRequest").with_args(
        Map::new()
            .with("domain", domain.to_value())
            .with("withAdditionalData", 0u8),
    );

    let reply = client.process(&mut request).await?;
    if !reply.is_success() {
        debug!(
            "retrieveDomainRequest for {} answered {}: {}",
            domain,
            reply.fault_code(),
            reply.fault_string()
        );
    }

    match reply.into_value() {
        Value::Map(data) if first_nameserver(&data).is_some() => Ok(Some(data)),
        _ => Ok(None),
    }
}

/// Publish `key` for `domain`; true when the registrar reports the domain active.
pub async fn modify_domain_dnssec(
    client: &RegistrarClient,
    domain: &DomainName,
    key: &DnssecKey,
) -> Result<bool, ApiError> {
    let mut request = client.request("modifyDomainRequest").with_args(
        Map::new()
            .with("domain", domain.to_value())
            .with("dnssecKeys", vec![key.to_value()]),
    );

    let reply = client.process(&mut request).await?;
    let status = reply.value().get("status").and_then(Value::as_str);
    info!(
        "modifyDomainRequest for {} answered {} (status {:?})",
        domain,
        reply.fault_code(),
        status
    );

    Ok(status == Some("ACT"))
}

/// Name of the first nameserver in a domain record
pub fn first_nameserver(data: &Map) -> Option<&str> {
    data.get("nameServers")?.path("0/name")?.as_str()
}

/// Whether a domain record already lists at least one DNSSEC key
pub fn has_dnssec_keys(data: &Map) -> bool {
    data.get("dnssecKeys")
        .and_then(|keys| keys.index(0))
        .is_some_and(|key| !key.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registrar::codec::Codec;
    use crate::registrar::reply::ReplyEnvelope;
    use crate::registrar::request::{Credentials, RequestEnvelope};

    fn domain_record(xml_data: &str) -> Map {
        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><openXML><reply><code>0</code><data>{}</data></reply></openXML>",
            xml_data
        );
        let reply = ReplyEnvelope::from_raw(xml.into_bytes(), &Codec::default()).unwrap();
        match reply.into_value() {
            Value::Map(map) => map,
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_domain_name_parse() {
        assert_eq!(
            DomainName::parse("example.com").unwrap(),
            DomainName {
                name: "example".to_string(),
                extension: "com".to_string()
            }
        );

        let uk = DomainName::parse("example.co.uk.").unwrap();
        assert_eq!(uk.name, "example");
        assert_eq!(uk.extension, "co.uk");
        assert_eq!(uk.to_string(), "example.co.uk");

        assert!(DomainName::parse("localhost").is_err());
        assert!(DomainName::parse(".com").is_err());
    }

    #[test]
    fn test_first_nameserver() {
        let data = domain_record(
            "<nameServers><array><item><name>ns1.example.net</name></item><item><name>ns2.example.net</name></item></array></nameServers>",
        );
        assert_eq!(first_nameserver(&data), Some("ns1.example.net"));

        let empty = domain_record("<nameServers><array/></nameServers><status>ACT</status>");
        assert_eq!(first_nameserver(&empty), None);
    }

    #[test]
    fn test_has_dnssec_keys() {
        let with_keys = domain_record(
            "<dnssecKeys><array><item><flags>257</flags><alg>13</alg></item></array></dnssecKeys>",
        );
        assert!(has_dnssec_keys(&with_keys));

        let without = domain_record("<dnssecKeys><array/></dnssecKeys><status>ACT</status>");
        assert!(!has_dnssec_keys(&without));

        let absent = domain_record("<status>ACT</status>");
        assert!(!has_dnssec_keys(&absent));
    }

    #[test]
    fn test_modify_request_body() {
        let codec = Codec::default();
        let key = DnssecKey {
            flags: 257,
            algorithm: 13,
            public_key: " mdsswUyr3DPW132mOi8V9xESWE8jTo0d \n".to_string(),
        };
        let domain = DomainName::parse("example.com").unwrap();

        let mut request = RequestEnvelope::new("modifyDomainRequest")
            .with_credentials(Credentials::new("u", "p"))
            .with_args(
                Map::new()
                    .with("domain", domain.to_value())
                    .with("dnssecKeys", vec![key.to_value()]),
            );
        let raw = String::from_utf8(request.raw(&codec).unwrap().to_vec()).unwrap();

        assert!(raw.contains(
            "<dnssecKeys><array><item><flags>257</flags><alg>13</alg><protocol>3</protocol><pubKey>mdsswUyr3DPW132mOi8V9xESWE8jTo0d</pubKey></item></array></dnssecKeys>"
        ));
        assert!(raw.contains("<domain><name>example</name><extension>com</extension></domain>"));
    }
}
