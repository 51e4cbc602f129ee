//! Error types for the registrar XML protocol

use thiserror::Error;

/// Fault code the registrar returns while it is down for maintenance.
pub const MAINTENANCE_CODE: i64 = 4005;

/// Code attached to transport failures ("Bad reply").
pub const BAD_REPLY_CODE: i64 = 4004;

/// Code attached to malformed protocol documents ("Wrong message format").
pub const WRONG_FORMAT_CODE: i64 = 4006;

/// Why a reply was classified as a maintenance condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceCause {
    /// The reply carried the reserved maintenance fault code
    FaultCode,
    /// The reply body could not be parsed or carried no payload at all
    EmptyDocument,
}

impl std::fmt::Display for MaintenanceCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaintenanceCause::FaultCode => write!(f, "maintenance fault code"),
            MaintenanceCause::EmptyDocument => write!(f, "empty reply document"),
        }
    }
}

/// Errors raised while building, sending or reading registrar envelopes
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad reply: {0}")]
    BadReply(String),

    #[error("API is temporarily unavailable due to maintenance ({0})")]
    Maintenance(MaintenanceCause),

    #[error("Wrong message format: {0}")]
    Format(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Invalid element name for map key: {0:?}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Wire-level fault code for the error, where the protocol defines one
    pub fn code(&self) -> Option<i64> {
        match self {
            ApiError::BadReply(_) => Some(BAD_REPLY_CODE),
            ApiError::Maintenance(_) => Some(MAINTENANCE_CODE),
            ApiError::Format(_) => Some(WRONG_FORMAT_CODE),
            _ => None,
        }
    }

    /// Whether the registrar reported itself as unavailable
    pub fn is_maintenance(&self) -> bool {
        matches!(self, ApiError::Maintenance(_))
    }
}

impl From<quick_xml::Error> for ApiError {
    fn from(err: quick_xml::Error) -> Self {
        ApiError::Xml(err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Xml(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ApiError::BadReply("empty".into()).code(), Some(4004));
        assert_eq!(
            ApiError::Maintenance(MaintenanceCause::FaultCode).code(),
            Some(4005)
        );
        assert_eq!(ApiError::Format("x".into()).code(), Some(4006));
        assert_eq!(ApiError::Xml("x".into()).code(), None);
    }

    #[test]
    fn test_maintenance_display() {
        let err = ApiError::Maintenance(MaintenanceCause::EmptyDocument);
        assert!(err.is_maintenance());
        assert!(err.to_string().contains("maintenance"));
        assert!(err.to_string().contains("empty reply document"));
    }
}
