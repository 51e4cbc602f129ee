//! DNSSEC sync
//!
//! Publishes the DNSSEC keys PowerDNS holds for its zones at the
//! Openprovider registrar, through the registrar's XML API.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - One reconcile pass from the environment
//! ├── config.rs      - Configuration management
//! ├── reconcile.rs   - Per-zone reconcile logic and pass report
//! ├── powerdns/      - PowerDNS HTTP API
//! │   ├── client.rs  - Zones and cryptokeys
//! │   └── models.rs  - JSON models, DNSKEY parsing
//! └── registrar/     - Registrar XML API
//!     ├── value.rs     - Structured values
//!     ├── document.rs  - XML element tree, charsets, filters
//!     ├── codec.rs     - Value ⇄ XML codec
//!     ├── request.rs   - Request envelope
//!     ├── reply.rs     - Reply envelope
//!     ├── transport.rs - HTTPS transport
//!     ├── client.rs    - API client
//!     ├── commands.rs  - Domain commands
//!     └── error.rs     - Error kinds and codes
//! ```

pub mod config;
pub mod powerdns;
pub mod reconcile;
pub mod registrar;

// Re-export main types for convenience
pub use config::SyncConfig;
pub use powerdns::{CryptoKey, PowerDnsClient, Zone};
pub use reconcile::{ReconcileReport, Reconciler, SkipReason, ZoneOutcome};
pub use registrar::{
    ApiError, Codec, CodecConfig, Credentials, HttpTransport, Map, RegistrarClient,
    ReplyEnvelope, RequestEnvelope, TransportConfig, Value,
};
