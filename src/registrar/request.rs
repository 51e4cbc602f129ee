//! Request envelope: credentials plus one command and its arguments

use crate::config::mask_secret;

use super::codec::Codec;
use super::document::{Document, DocumentFilter, Element};
use super::error::ApiError;
use super::value::{Map, Value};
use super::{ROOT_TAG, Wire};

const CREDENTIALS_TAG: &str = "credentials";

/// Authentication block sent with every request
#[derive(Clone, Default, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub hash: Option<String>,
    pub token: Option<String>,
    pub ip: Option<String>,
    pub language: Option<String>,
    /// Free-form extra data
    pub misc: Option<Value>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    fn to_element(&self, codec: &Codec) -> Result<Element, ApiError> {
        let mut element = Element::new(CREDENTIALS_TAG)
            .with_child(text_element("username", &self.username, codec))
            .with_child(text_element("password", &self.password, codec))
            .with_child(text_element("hash", self.hash.as_deref().unwrap_or_default(), codec));

        let optional = [
            ("language", &self.language),
            ("token", &self.token),
            ("ip", &self.ip),
        ];
        for (tag, value) in optional {
            if let Some(value) = value {
                element.append(text_element(tag, value, codec));
            }
        }

        if let Some(misc) = &self.misc {
            element.append(codec.to_element("misc", misc)?);
        }
        Ok(element)
    }

    fn from_value(value: &Value) -> Self {
        let empty = Map::new();
        let fields = value.as_map().unwrap_or(&empty);
        let text = |key: &str| fields.get_str(key).map(str::to_string);

        Self {
            username: text("username").unwrap_or_default(),
            password: text("password").unwrap_or_default(),
            hash: text("hash"),
            token: text("token"),
            ip: text("ip"),
            language: text("language"),
            misc: fields.get("misc").filter(|v| !v.is_null()).cloned(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &mask_secret(&self.password))
            .field("hash", &self.hash.as_deref().map(mask_secret))
            .field("token", &self.token.as_deref().map(mask_secret))
            .field("ip", &self.ip)
            .field("language", &self.language)
            .field("misc", &self.misc)
            .finish()
    }
}

/// One API call: a command name, its argument tree and the credentials.
///
/// The wire payload is rendered the first time [`RequestEnvelope::raw`] is
/// called and reused afterwards. Changing the envelope after that point
/// does not change what is sent.
#[derive(Default)]
pub struct RequestEnvelope {
    command: String,
    args: Value,
    credentials: Credentials,
    filters: Vec<Box<dyn DocumentFilter>>,
    wire: Wire,
}

impl RequestEnvelope {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Wrap a payload received verbatim; call [`RequestEnvelope::parse_content`]
    /// to populate the fields from it.
    pub fn from_raw(raw: impl Into<Vec<u8>>) -> Self {
        Self {
            wire: Wire::Rendered(raw.into()),
            ..Self::default()
        }
    }

    pub fn with_args(mut self, args: impl Into<Value>) -> Self {
        self.args = args.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.credentials.language = Some(language.into());
        self
    }

    pub fn with_misc(mut self, misc: impl Into<Value>) -> Self {
        self.credentials.misc = Some(misc.into());
        self
    }

    /// Register a hook that sees the parsed document before fields are
    /// extracted from it
    pub fn add_filter(&mut self, filter: impl DocumentFilter + 'static) {
        self.filters.push(Box::new(filter));
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &Value {
        &self.args
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn is_rendered(&self) -> bool {
        self.wire.is_rendered()
    }

    /// Wire payload, rendered on first use
    pub fn raw(&mut self, codec: &Codec) -> Result<&[u8], ApiError> {
        let Self {
            command,
            args,
            credentials,
            wire,
            ..
        } = self;
        wire.get_or_render(|| render(command, args, credentials, codec))
    }

    /// Populate command, arguments and credentials from the raw payload.
    ///
    /// Does nothing for an envelope that was never given a payload.
    pub fn parse_content(&mut self, codec: &Codec) -> Result<(), ApiError> {
        let Wire::Rendered(bytes) = &self.wire else {
            return Ok(());
        };

        let mut doc = Document::parse(bytes, codec.charset())?;
        for filter in &self.filters {
            filter.apply(&mut doc)?;
        }

        let credentials = match doc.root.child(CREDENTIALS_TAG) {
            Some(element) => Credentials::from_value(&codec.decode(element)?),
            None => Credentials::default(),
        };

        let mut commands = doc.root.elements().filter(|e| e.name != CREDENTIALS_TAG);
        let command = commands
            .next()
            .ok_or_else(|| ApiError::Format("request carries no command".to_string()))?;
        if let Some(extra) = commands.next() {
            return Err(ApiError::Format(format!(
                "request carries more than one command: <{}> and <{}>",
                command.name, extra.name
            )));
        }

        self.args = codec.decode(command)?;
        self.command = command.name.clone();
        self.credentials = credentials;
        Ok(())
    }
}

fn text_element(tag: &str, text: &str, codec: &Codec) -> Element {
    Element::new(tag).with_text(codec.encode_str(text))
}

fn render(
    command: &str,
    args: &Value,
    credentials: &Credentials,
    codec: &Codec,
) -> Result<Vec<u8>, ApiError> {
    codec.check_name(command)?;

    let root = Element::new(ROOT_TAG)
        .with_child(credentials.to_element(codec)?)
        .with_child(codec.to_element(command, args)?);

    Document::new(root).to_bytes(codec.charset())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retrieve_domain_request() -> RequestEnvelope {
        RequestEnvelope::new("retrieveDomainRequest")
            .with_credentials(Credentials::new("reseller", "s3cret-passw0rd"))
            .with_args(
                Map::new()
                    .with(
                        "domain",
                        Map::new().with("name", "example").with("extension", "com"),
                    )
                    .with("withAdditionalData", 0u32),
            )
    }

    #[test]
    fn test_retrieve_domain_document_shape() {
        let codec = Codec::default();
        let mut request = retrieve_domain_request();
        let raw = request.raw(&codec).unwrap().to_vec();

        let doc = Document::parse(&raw, codec.charset()).unwrap();
        assert_eq!(doc.root.name, "openXML");

        let names: Vec<_> = doc.root.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["credentials", "retrieveDomainRequest"]);

        let command = doc.root.child("retrieveDomainRequest").unwrap();
        let domain = command.child("domain").unwrap();
        assert_eq!(domain.child("name").unwrap().text(), "example");
        assert_eq!(domain.child("extension").unwrap().text(), "com");
        assert_eq!(command.child("withAdditionalData").unwrap().text(), "0");
    }

    #[test]
    fn test_credentials_always_carry_hash() {
        let codec = Codec::default();
        let mut request = retrieve_domain_request();
        let raw = request.raw(&codec).unwrap().to_vec();

        let doc = Document::parse(&raw, codec.charset()).unwrap();
        let credentials = doc.root.child("credentials").unwrap();
        let names: Vec<_> = credentials.elements().map(|e| e.name.as_str()).collect();

        assert_eq!(names, vec!["username", "password", "hash"]);
        assert!(credentials.child("hash").unwrap().is_empty());
    }

    #[test]
    fn test_optional_credentials_emitted_when_present() {
        let codec = Codec::default();
        let mut request = RequestEnvelope::new("checkDomainRequest")
            .with_credentials(
                Credentials::new("reseller", "pw")
                    .with_token("tok")
                    .with_ip("192.0.2.10"),
            )
            .with_language("nl");
        let raw = request.raw(&codec).unwrap().to_vec();

        let doc = Document::parse(&raw, codec.charset()).unwrap();
        let credentials = doc.root.child("credentials").unwrap();
        assert_eq!(credentials.child("language").unwrap().text(), "nl");
        assert_eq!(credentials.child("token").unwrap().text(), "tok");
        assert_eq!(credentials.child("ip").unwrap().text(), "192.0.2.10");
        assert!(credentials.child("misc").is_none());
    }

    #[test]
    fn test_round_trip_with_misc() {
        let codec = Codec::default();
        let misc = Value::Map(
            Map::new()
                .with("reseller", Map::new().with("id", "42").with("tier", "gold"))
                .with("tags", vec![Value::from("a"), Value::from("b")]),
        );
        let mut outbound = retrieve_domain_request().with_misc(misc.clone());
        let raw = outbound.raw(&codec).unwrap().to_vec();

        let mut inbound = RequestEnvelope::from_raw(raw);
        inbound.parse_content(&codec).unwrap();

        assert_eq!(inbound.command(), "retrieveDomainRequest");
        assert_eq!(inbound.args(), outbound.args());
        assert_eq!(inbound.credentials().username, "reseller");
        assert_eq!(inbound.credentials().password, "s3cret-passw0rd");
        assert_eq!(inbound.credentials().hash, None);
        assert_eq!(inbound.credentials().misc, Some(misc));
    }

    #[test]
    fn test_render_is_cached() {
        let codec = Codec::default();
        let mut request = retrieve_domain_request();
        let first = request.raw(&codec).unwrap().to_vec();
        assert!(request.is_rendered());

        let mut request = request.with_args(Map::new().with("changed", "yes"));
        let second = request.raw(&codec).unwrap().to_vec();

        assert_eq!(first, second);
        assert!(!String::from_utf8(second).unwrap().contains("changed"));
    }

    #[test]
    fn test_filters_run_in_order_before_extraction() {
        let codec = Codec::default();
        let raw = retrieve_domain_request().raw(&codec).unwrap().to_vec();

        let mut inbound = RequestEnvelope::from_raw(raw);
        inbound.add_filter(|doc: &mut Document| -> Result<(), ApiError> {
            if let Some(credentials) = doc.root.child_mut("credentials") {
                credentials.remove_children("password");
                credentials.append(Element::new("password").with_text("first"));
            }
            Ok(())
        });
        inbound.add_filter(|doc: &mut Document| -> Result<(), ApiError> {
            let password = doc
                .root
                .child_mut("credentials")
                .and_then(|c| c.child_mut("password"))
                .ok_or_else(|| ApiError::Format("no password".to_string()))?;
            let seen = password.text();
            *password = Element::new("password").with_text(format!("{}-second", seen));
            Ok(())
        });
        inbound.parse_content(&codec).unwrap();

        assert_eq!(inbound.credentials().password, "first-second");
    }

    #[test]
    fn test_parse_without_command_fails() {
        let codec = Codec::default();
        let raw = b"<openXML><credentials><username>u</username></credentials></openXML>";
        let mut inbound = RequestEnvelope::from_raw(&raw[..]);

        assert!(matches!(inbound.parse_content(&codec), Err(ApiError::Format(_))));
    }

    #[test]
    fn test_parse_malformed_xml_fails() {
        let codec = Codec::default();
        let mut inbound = RequestEnvelope::from_raw(&b"<openXML><credentials>"[..]);

        assert!(matches!(inbound.parse_content(&codec), Err(ApiError::Xml(_))));
    }

    #[test]
    fn test_invalid_command_name_rejected() {
        let codec = Codec::default();
        let mut request = RequestEnvelope::new("not a command");

        assert!(matches!(request.raw(&codec), Err(ApiError::InvalidKey(_))));
        assert!(!request.is_rendered());
    }

    #[test]
    fn test_credentials_debug_masks_secrets() {
        let credentials = Credentials::new("reseller", "very-secret-password-value");
        let debug = format!("{:?}", credentials);

        assert!(debug.contains("reseller"));
        assert!(!debug.contains("very-secret-password-value"));
    }
}
