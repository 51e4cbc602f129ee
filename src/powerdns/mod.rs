//! PowerDNS HTTP API client
//!
//! Only the endpoints the DNSSEC sync needs: zone listing, cryptokey
//! listing and deletion, and switching DNSSEC on for a zone.

pub mod client;
pub mod models;

pub use client::PowerDnsClient;
pub use models::{CryptoKey, DnskeyFields, Zone};
