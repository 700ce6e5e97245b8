#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use thiserror::Error;

use crate::types::RequestStatus;

/// Error code constants for type-safe error handling
pub mod code {
    pub const VALIDATION: &str = "VALIDATION";
    pub const MODERATION_REJECTED: &str = "MODERATION_REJECTED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const SELF_OFFER: &str = "SELF_OFFER";
    pub const ALREADY_OFFERED: &str = "ALREADY_OFFERED";
    pub const INVALID_TRANSITION: &str = "INVALID_TRANSITION";
    pub const NOTFOUND: &str = "NOTFOUND";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const STORE_UNAVAILABLE: &str = "STORE_UNAVAILABLE";
    pub const CLASSIFIER_UNAVAILABLE: &str = "CLASSIFIER_UNAVAILABLE";
    pub const INTERNAL: &str = "INTERNAL";
}

#[derive(Error, Debug)]
pub enum NeighborlyError {
    #[error("Validation failed for fields: {}", .fields.join(", "))]
    Validation { fields: Vec<String> },

    #[error("Content rejected by moderation: {reason}")]
    ModerationRejected { reason: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Cannot offer help on your own request")]
    SelfOffer,

    #[error("Already offered to help on this request")]
    AlreadyOffered,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Primary store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl NeighborlyError {
    /// Returns the protocol error code for this error
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => code::VALIDATION,
            Self::ModerationRejected { .. } => code::MODERATION_REJECTED,
            Self::Forbidden(_) => code::FORBIDDEN,
            Self::SelfOffer => code::SELF_OFFER,
            Self::AlreadyOffered => code::ALREADY_OFFERED,
            Self::InvalidTransition { .. } => code::INVALID_TRANSITION,
            Self::NotFound(_) => code::NOTFOUND,
            Self::Unauthorized(_) => code::UNAUTHORIZED,
            Self::StoreUnavailable(_) => code::STORE_UNAVAILABLE,
            Self::ClassifierUnavailable(_) => code::CLASSIFIER_UNAVAILABLE,
            Self::DatabaseError(_)
            | Self::SqlxError(_)
            | Self::ConfigError(_)
            | Self::SerializationError(_)
            | Self::IoError(_) => code::INTERNAL,
        }
    }

    /// Returns the HTTP status code this error maps to at the API surface.
    ///
    /// Infrastructure errors only reach the surface when both the primary
    /// store and the fallback path have failed; they map to 500.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. }
            | Self::ModerationRejected { .. }
            | Self::SelfOffer
            | Self::AlreadyOffered => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::InvalidTransition { .. } => 409,
            Self::StoreUnavailable(_)
            | Self::ClassifierUnavailable(_)
            | Self::DatabaseError(_)
            | Self::SqlxError(_)
            | Self::ConfigError(_)
            | Self::SerializationError(_)
            | Self::IoError(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, NeighborlyError>;

#[cfg(test)]
mod tests {
    use super::{code, NeighborlyError};
    use crate::types::RequestStatus;

    #[test]
    fn codes_and_statuses_match_taxonomy() {
        let validation = NeighborlyError::Validation {
            fields: vec!["latitude".to_string()],
        };
        assert_eq!(validation.code(), code::VALIDATION);
        assert_eq!(validation.http_status(), 400);

        assert_eq!(NeighborlyError::SelfOffer.http_status(), 400);
        assert_eq!(
            NeighborlyError::Forbidden("not the author".to_string()).http_status(),
            403
        );
        assert_eq!(
            NeighborlyError::NotFound("request x".to_string()).http_status(),
            404
        );

        let transition = NeighborlyError::InvalidTransition {
            from: RequestStatus::Cancelled,
            to: RequestStatus::Open,
        };
        assert_eq!(transition.code(), code::INVALID_TRANSITION);
        assert_eq!(transition.http_status(), 409);
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = NeighborlyError::InvalidTransition {
            from: RequestStatus::Open,
            to: RequestStatus::Completed,
        };
        let message = err.to_string();
        assert!(message.contains("open"));
        assert!(message.contains("completed"));
    }
}
