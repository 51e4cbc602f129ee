//! Registrar API client: envelope → transport → reply

use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{Level, debug};

use super::codec::Codec;
use super::error::ApiError;
use super::reply::ReplyEnvelope;
use super::request::{Credentials, RequestEnvelope};
use super::transport::HttpTransport;

/// Elements whose text never reaches the logs
const SECRET_ELEMENTS: [&str; 3] = ["password", "hash", "token"];

pub struct RegistrarClient {
    transport: HttpTransport,
    codec: Codec,
    credentials: Credentials,
}

impl RegistrarClient {
    pub fn new(transport: HttpTransport, codec: Codec, credentials: Credentials) -> Self {
        Self {
            transport,
            codec,
            credentials,
        }
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// New request for `command` carrying this client's credentials
    pub fn request(&self, command: &str) -> RequestEnvelope {
        RequestEnvelope::new(command).with_credentials(self.credentials.clone())
    }

    /// Send `request` and parse the reply
    pub async fn process(&self, request: &mut RequestEnvelope) -> Result<ReplyEnvelope, ApiError> {
        let raw = self.process_raw_reply(request).await?;
        ReplyEnvelope::from_raw(raw, &self.codec)
    }

    /// Send `request` and return the reply body without parsing it
    pub async fn process_raw_reply(
        &self,
        request: &mut RequestEnvelope,
    ) -> Result<Vec<u8>, ApiError> {
        let payload = request.raw(&self.codec)?;
        if tracing::enabled!(Level::DEBUG) {
            debug!(
                "Sending {}: {}",
                request_command(payload),
                redact_for_logging(payload)
            );
        }

        let raw = self.transport.send(payload).await?;
        if tracing::enabled!(Level::DEBUG) {
            debug!("Reply: {}", String::from_utf8_lossy(&raw));
        }
        Ok(raw)
    }
}

fn request_command(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    let mut reader = Reader::from_str(&text);
    let mut depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if depth == 2 && name != "credentials" {
                    return name;
                }
            }
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Empty(e)) if depth == 1 => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name != "credentials" {
                    return name;
                }
            }
            Ok(Event::Eof) | Err(_) => return "request".to_string(),
            _ => {}
        }
    }
}

/// Render a payload for the logs with credential secrets masked
pub fn redact_for_logging(payload: &[u8]) -> String {
    let xml = String::from_utf8_lossy(payload);
    redact_elements(&xml, &SECRET_ELEMENTS)
        .unwrap_or_else(|e| format!("<{} bytes, not loggable: {}>", payload.len(), e))
}

/// Replace the text of every element named in `secrets` with `***`.
pub fn redact_elements(xml: &str, secrets: &[&str]) -> Result<String, ApiError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut inside_secret: Option<usize> = None;
    let mut depth: usize = 0;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                let name_bytes = e.name();
                let local = std::str::from_utf8(name_bytes.as_ref()).unwrap_or_default();
                if inside_secret.is_none() && secrets.contains(&local) {
                    inside_secret = Some(depth);
                }
                writer.write_event(Event::Start(e))?;
            }
            Event::Text(t) => {
                if inside_secret.is_some() {
                    writer.write_event(Event::Text(BytesText::new("***")))?;
                } else {
                    writer.write_event(Event::Text(t))?;
                }
            }
            Event::CData(c) => {
                if inside_secret.is_some() {
                    writer.write_event(Event::Text(BytesText::new("***")))?;
                } else {
                    writer.write_event(Event::CData(c))?;
                }
            }
            Event::End(e) => {
                writer.write_event(Event::End(e))?;
                if inside_secret == Some(depth) {
                    inside_secret = None;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    String::from_utf8(writer.into_inner())
        .map_err(|e| ApiError::Xml(format!("Invalid UTF-8 in redacted XML: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registrar::transport::TransportConfig;

    #[test]
    fn test_redact_credentials() {
        let xml = "<openXML><credentials><username>reseller</username><password>hunter2</password><hash/><token>abc</token></credentials><retrieveDomainRequest><domain><name>example</name></domain></retrieveDomainRequest></openXML>";

        let redacted = redact_elements(xml, &SECRET_ELEMENTS).unwrap();

        assert!(redacted.contains("<username>reseller</username>"));
        assert!(redacted.contains("<password>***</password>"));
        assert!(redacted.contains("<token>***</token>"));
        assert!(redacted.contains("<hash/>"));
        assert!(redacted.contains("<name>example</name>"));
        assert!(!redacted.contains("hunter2"));
    }

    #[test]
    fn test_redact_unparseable_payload() {
        let logged = redact_for_logging(b"<openXML><password>x</wrong></openXML>");
        assert!(logged.contains("not loggable"));
        assert!(!logged.contains("<password>x"));
    }

    #[test]
    fn test_request_command_name() {
        let codec = Codec::default();
        let mut request = RequestEnvelope::new("retrieveDomainRequest")
            .with_credentials(Credentials::new("u", "p"));
        let payload = request.raw(&codec).unwrap();

        assert_eq!(request_command(payload), "retrieveDomainRequest");
    }

    #[test]
    fn test_client_requests_carry_credentials() {
        let transport = HttpTransport::new(TransportConfig::default()).unwrap();
        let client = RegistrarClient::new(
            transport,
            Codec::default(),
            Credentials::new("reseller", "pw"),
        );

        let request = client.request("modifyDomainRequest");
        assert_eq!(request.command(), "modifyDomainRequest");
        assert_eq!(request.credentials().username, "reseller");
    }
}
