//! Error types for the travel store

use thiserror::Error;

use crate::model::EntityKind;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the travel store
///
/// Index corruption has no variant: a lost index record is reported through
/// `tracing::error!` followed by a panic.
#[derive(Error, Debug)]
pub enum Error {
    /// Field out of bounds, missing value or immutable id mismatch
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Insert of an id already held by a valid record
    #[error("{entity} {id} already exists")]
    AlreadyExists { entity: EntityKind, id: u32 },

    /// Entity is absent or was never stored
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: u32 },

    /// Visit references a location that is not stored
    #[error("location with id {0} doesn't exist")]
    UnknownLocation(u32),

    /// Visit references a user that is not stored
    #[error("user with id {0} doesn't exist")]
    UnknownUser(u32),

    /// Query parameter failed to parse
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Id is above the configured table ceiling
    #[error("{entity} {id} exceeds table capacity {capacity}")]
    CapacityExceeded {
        entity: EntityKind,
        id: u32,
        capacity: u32,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a validation failure
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// True for errors caused by the caller's input (mapped to 400 at the edge)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::AlreadyExists { .. }
                | Error::UnknownLocation(_)
                | Error::UnknownUser(_)
                | Error::InvalidFilter(_)
                | Error::CapacityExceeded { .. }
                | Error::Json(_)
        )
    }

    /// True when the target entity is missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::AlreadyExists {
            entity: EntityKind::User,
            id: 7,
        };
        assert_eq!(err.to_string(), "user 7 already exists");
        assert_eq!(
            Error::UnknownLocation(3).to_string(),
            "location with id 3 doesn't exist"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::validation("bad").is_client_error());
        assert!(Error::UnknownUser(1).is_client_error());
        assert!(!Error::Internal("boom".into()).is_client_error());

        let missing = Error::NotFound {
            entity: EntityKind::Visit,
            id: 1,
        };
        assert!(missing.is_not_found());
        assert!(!missing.is_client_error());
    }
}
