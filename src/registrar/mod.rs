//! Openprovider registrar XML API
//!
//! This module provides the client side of the registrar protocol:
//! - Structured-data ⇄ XML codec
//! - Request envelope (credentials + command) and reply envelope
//!   (fault code + data + warnings)
//! - HTTPS transport and the API client tying them together
//! - Typed wrappers for the domain commands the reconciler needs

pub mod client;
pub mod codec;
pub mod commands;
pub mod document;
pub mod error;
pub mod reply;
pub mod request;
pub mod transport;
pub mod value;

pub use client::RegistrarClient;
pub use codec::{Codec, CodecConfig};
pub use commands::{DnssecKey, DomainName};
pub use document::{Charset, Document, DocumentFilter, Element, Node};
pub use error::{ApiError, MAINTENANCE_CODE, MaintenanceCause};
pub use reply::ReplyEnvelope;
pub use request::{Credentials, RequestEnvelope};
pub use transport::{HttpTransport, TlsTrust, TransportConfig};
pub use value::{Map, Stringable, Value};

/// Root element of every request and reply document
pub const ROOT_TAG: &str = "openXML";

/// Serialized form of an envelope. Moves from `Pending` to `Rendered` at
/// most once; there is no way back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum Wire {
    #[default]
    Pending,
    Rendered(Vec<u8>),
}

impl Wire {
    pub(crate) fn is_rendered(&self) -> bool {
        matches!(self, Wire::Rendered(_))
    }

    /// Return the cached payload, rendering it first if still pending
    pub(crate) fn get_or_render(
        &mut self,
        render: impl FnOnce() -> Result<Vec<u8>, ApiError>,
    ) -> Result<&[u8], ApiError> {
        if let Wire::Pending = self {
            *self = Wire::Rendered(render()?);
        }
        match self {
            Wire::Rendered(bytes) => Ok(bytes),
            Wire::Pending => Err(ApiError::Xml("envelope payload was not rendered".to_string())),
        }
    }
}
