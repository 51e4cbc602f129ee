//! Reply envelope: fault code, fault message, data tree and warnings

use tracing::{error, warn};

use super::codec::Codec;
use super::document::{Document, DocumentFilter, Element};
use super::error::{ApiError, MAINTENANCE_CODE, MaintenanceCause};
use super::value::{Map, Value};
use super::{ROOT_TAG, Wire};

const REPLY_TAG: &str = "reply";

/// Reply to one API call.
///
/// Built either from a raw response with [`ReplyEnvelope::from_raw`], or
/// assembled with the setters and rendered with [`ReplyEnvelope::raw`].
#[derive(Default)]
pub struct ReplyEnvelope {
    fault_code: i64,
    fault_string: String,
    value: Value,
    warnings: Vec<Value>,
    maintenance: Option<Value>,
    filters: Vec<Box<dyn DocumentFilter>>,
    wire: Wire,
}

impl ReplyEnvelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw response.
    ///
    /// An unparseable body is logged and treated as an empty document. An
    /// empty document, or one carrying the maintenance fault code, yields
    /// [`ApiError::Maintenance`] instead of an envelope.
    pub fn from_raw(raw: impl Into<Vec<u8>>, codec: &Codec) -> Result<Self, ApiError> {
        let raw = raw.into();

        let doc = match Document::parse(&raw, codec.charset()) {
            Ok(doc) => doc,
            Err(e) => {
                error!(
                    "Cannot parse reply XML ({} bytes): {}: {}",
                    raw.len(),
                    e,
                    String::from_utf8_lossy(&raw)
                );
                return Err(maintenance(MaintenanceCause::EmptyDocument));
            }
        };

        if doc.root.elements().next().is_none() {
            if doc.root.text().trim().is_empty() {
                return Err(maintenance(MaintenanceCause::EmptyDocument));
            }
            return Err(ApiError::Format(
                "reply document carries no fields".to_string(),
            ));
        }

        // The maintenance code wins over whatever the payload holds
        if let Some(code) = doc.root.child(REPLY_TAG).and_then(|r| r.child("code")) {
            if code.text().trim().parse::<i64>().ok() == Some(MAINTENANCE_CODE) {
                return Err(maintenance(MaintenanceCause::FaultCode));
            }
        }

        let fields = match codec.decode(&doc.root)? {
            Value::Map(fields) => fields,
            _ => {
                return Err(ApiError::Format(
                    "reply document carries no fields".to_string(),
                ));
            }
        };

        let reply = fields
            .get(REPLY_TAG)
            .and_then(Value::as_map)
            .ok_or_else(|| ApiError::Format("reply document has no <reply>".to_string()))?;

        let code = parse_code(reply)?;

        let warnings = match reply.get("warnings") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::List(items)) => items.clone(),
            Some(other) => vec![other.clone()],
        };

        Ok(Self {
            fault_code: code,
            fault_string: reply.get_str("desc").unwrap_or_default().to_string(),
            value: reply.get("data").cloned().unwrap_or_default(),
            warnings,
            maintenance: reply.get("maintenance").filter(|v| !v.is_null()).cloned(),
            filters: Vec::new(),
            wire: Wire::Rendered(raw),
        })
    }

    pub fn set_fault_code(&mut self, code: i64) -> &mut Self {
        self.fault_code = code;
        self
    }

    pub fn set_fault_string(&mut self, message: impl Into<String>) -> &mut Self {
        self.fault_string = message.into();
        self
    }

    pub fn set_value(&mut self, value: impl Into<Value>) -> &mut Self {
        self.value = value.into();
        self
    }

    pub fn set_warnings(&mut self, warnings: Vec<Value>) -> &mut Self {
        self.warnings = warnings;
        self
    }

    /// Register a hook that sees the built document before it is serialized
    pub fn add_filter(&mut self, filter: impl DocumentFilter + 'static) {
        self.filters.push(Box::new(filter));
    }

    pub fn fault_code(&self) -> i64 {
        self.fault_code
    }

    pub fn fault_string(&self) -> &str {
        &self.fault_string
    }

    /// Fault code 0
    pub fn is_success(&self) -> bool {
        self.fault_code == 0
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn warnings(&self) -> &[Value] {
        &self.warnings
    }

    /// Scheduled maintenance notice, when the registrar announces one
    pub fn maintenance(&self) -> Option<&Value> {
        self.maintenance.as_ref()
    }

    pub fn is_rendered(&self) -> bool {
        self.wire.is_rendered()
    }

    /// Wire payload, rendered on first use
    pub fn raw(&mut self, codec: &Codec) -> Result<&[u8], ApiError> {
        let Self {
            fault_code,
            fault_string,
            value,
            warnings,
            filters,
            wire,
            ..
        } = self;

        wire.get_or_render(|| {
            let mut reply = Element::new(REPLY_TAG)
                .with_child(Element::new("code").with_text(fault_code.to_string()))
                .with_child(Element::new("desc").with_text(codec.encode_str(fault_string)))
                .with_child(codec.to_element("data", value)?);
            if !warnings.is_empty() {
                reply.append(codec.to_element("warnings", &Value::List(warnings.clone()))?);
            }

            let mut doc = Document::new(Element::new(ROOT_TAG).with_child(reply));
            for filter in filters.iter() {
                filter.apply(&mut doc)?;
            }
            doc.to_bytes(codec.charset())
        })
    }
}

impl std::fmt::Debug for ReplyEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyEnvelope")
            .field("fault_code", &self.fault_code)
            .field("fault_string", &self.fault_string)
            .field("value", &self.value)
            .field("warnings", &self.warnings)
            .field("maintenance", &self.maintenance)
            .field("filters", &self.filters.len())
            .finish()
    }
}

fn maintenance(cause: MaintenanceCause) -> ApiError {
    warn!("Registrar API reports maintenance ({})", cause);
    ApiError::Maintenance(cause)
}

fn parse_code(reply: &Map) -> Result<i64, ApiError> {
    let text = reply
        .get_str("code")
        .ok_or_else(|| ApiError::Format("reply has no fault code".to_string()))?;
    text.trim()
        .parse()
        .map_err(|_| ApiError::Format(format!("fault code is not an integer: {:?}", text)))
}
