//! Error types for entistore core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in entistore core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The type is neither allow-listed nor declared as an entity type.
    #[error("type {type_name} is not registered as an entity type")]
    NotRegistered {
        /// Name of the offending type.
        type_name: String,
    },

    /// An entity was put into a primary index it cannot be viewed as.
    #[error("entity of type {type_name} cannot be viewed as {view}")]
    NotViewableAs {
        /// Concrete type of the entity.
        type_name: String,
        /// Type of the primary index view.
        view: String,
    },

    /// Two views or an index and its primary disagree. Never recoverable.
    #[error("internal inconsistency: {message}")]
    Inconsistency {
        /// Description of the inconsistency.
        message: String,
    },

    /// The entity is already present in the index.
    #[error("entity already present in {index} under {key}")]
    DuplicateEntity {
        /// Name of the index that rejected the write.
        index: String,
        /// Key (or identity) the entity is already known under.
        key: String,
    },

    /// A uniqueness-asserting lookup matched more than one entity.
    #[error("expected a single unique entity in {index} but found {count}")]
    NotUnique {
        /// Name of the queried index.
        index: String,
        /// Number of matching entities.
        count: usize,
    },

    /// Lookup parameters do not match the key shape of an index.
    #[error("parameter mismatch in {index}: {message}")]
    ArityOrTypeMismatch {
        /// Name of the queried index.
        index: String,
        /// Description of the mismatch.
        message: String,
    },

    /// No more identifiers can be produced for this instant.
    #[error("identifier sequence exhausted at instant {instant_millis}; supply a later instant")]
    SequenceExhausted {
        /// The exhausted instant in milliseconds since the epoch.
        instant_millis: i64,
    },

    /// An instant earlier than the previous one was supplied.
    #[error("instant {requested_millis} is earlier than previous instant {previous_millis}")]
    NonMonotonicInstant {
        /// Previously used instant.
        previous_millis: i64,
        /// Rejected instant.
        requested_millis: i64,
    },

    /// The requested association handling is not implemented.
    #[error("not implemented: {feature}")]
    NotImplemented {
        /// Description of the missing feature.
        feature: String,
    },

    /// A schema refers to an association end that does not exist.
    #[error("unknown association end {end} on type {type_name}")]
    UnknownAssociationEnd {
        /// Type expected to declare the end.
        type_name: String,
        /// Name of the missing end.
        end: String,
    },

    /// An identifier could not be parsed.
    #[error("invalid identifier: {message}")]
    InvalidIdentifier {
        /// Description of the parse failure.
        message: String,
    },

    /// Invalid snapshot format or version.
    #[error("invalid snapshot format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Encoding or decoding failed.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The owning store or primary index has been dropped.
    #[error("entity store is closed")]
    StoreClosed,

    /// A listener worker thread could not be started.
    #[error("failed to start listener worker: {message}")]
    ListenerSpawn {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a not registered error.
    pub fn not_registered(type_name: impl Into<String>) -> Self {
        Self::NotRegistered {
            type_name: type_name.into(),
        }
    }

    /// Creates an inconsistency error.
    pub fn inconsistency(message: impl Into<String>) -> Self {
        Self::Inconsistency {
            message: message.into(),
        }
    }

    /// Creates a duplicate entity error.
    pub fn duplicate_entity(index: impl Into<String>, key: impl Into<String>) -> Self {
        Self::DuplicateEntity {
            index: index.into(),
            key: key.into(),
        }
    }

    /// Creates a parameter mismatch error.
    pub fn arity_or_type_mismatch(index: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ArityOrTypeMismatch {
            index: index.into(),
            message: message.into(),
        }
    }

    /// Creates a not implemented error.
    pub fn not_implemented(feature: impl Into<String>) -> Self {
        Self::NotImplemented {
            feature: feature.into(),
        }
    }

    /// Creates an invalid identifier error.
    pub fn invalid_identifier(message: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Returns true for faults that indicate corrupted store state.
    ///
    /// These are never retried; the store should be considered broken.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Inconsistency { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = CoreError::not_registered("DummyInterface");
        assert_eq!(
            err.to_string(),
            "type DummyInterface is not registered as an entity type"
        );

        let err = CoreError::NotUnique {
            index: "humansByLastName".into(),
            count: 2,
        };
        assert!(err.to_string().contains("found 2"));
    }

    #[test]
    fn only_inconsistency_is_fatal() {
        assert!(CoreError::inconsistency("views diverged").is_fatal());
        assert!(!CoreError::duplicate_entity("idx", "key").is_fatal());
        assert!(!CoreError::StoreClosed.is_fatal());
    }
}
