// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for oxbow-core.
//!
//! Provides a unified error type covering every failure surfaced by the
//! engine: lookups, state checks, optimistic concurrency, and storage.
//! Activity failures are not errors at this level; they fault the instance
//! and are recorded on its state.

use std::fmt;
use uuid::Uuid;

/// Result type using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine errors that can occur while creating, ticking, or resuming
/// workflow instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum EngineError {
    /// Instance was not found in storage.
    InstanceNotFound {
        /// The instance ID that was not found.
        instance_id: Uuid,
    },

    /// No workflow definition is registered under the given ID.
    DefinitionNotFound {
        /// The definition ID that was not found.
        definition_id: String,
    },

    /// A definition references an activity kind with no registered
    /// implementation.
    UnknownActivity {
        /// The unregistered activity kind.
        kind: String,
    },

    /// Instance is in an invalid state for the requested operation.
    InvalidInstanceState {
        /// The instance ID.
        instance_id: Uuid,
        /// The expected status.
        expected: String,
        /// The actual status.
        actual: String,
    },

    /// Optimistic save lost the race: storage holds a newer revision.
    /// Callers retry from a fresh load; the engine does this itself a
    /// bounded number of times before giving up.
    Conflict {
        /// The instance ID.
        instance_id: Uuid,
        /// The revision the failed save was based on.
        revision: u64,
    },

    /// A variable reference pointed at a path that does not exist.
    FieldNotFound {
        /// The dotted path that failed to resolve.
        path: String,
    },

    /// Database operation failed.
    Database {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// State serialization or deserialization failed.
    Serialization {
        /// Error details.
        details: String,
    },
}

impl EngineError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InstanceNotFound { .. } => "INSTANCE_NOT_FOUND",
            Self::DefinitionNotFound { .. } => "DEFINITION_NOT_FOUND",
            Self::UnknownActivity { .. } => "UNKNOWN_ACTIVITY",
            Self::InvalidInstanceState { .. } => "INVALID_INSTANCE_STATE",
            Self::Conflict { .. } => "CONCURRENCY_CONFLICT",
            Self::FieldNotFound { .. } => "FIELD_NOT_FOUND",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Serialization { .. } => "SERIALIZATION_ERROR",
        }
    }

    /// Whether retrying the operation against fresh state can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InstanceNotFound { instance_id } => {
                write!(f, "Instance '{}' not found", instance_id)
            }
            Self::DefinitionNotFound { definition_id } => {
                write!(f, "Workflow definition '{}' not found", definition_id)
            }
            Self::UnknownActivity { kind } => {
                write!(f, "No activity registered for kind '{}'", kind)
            }
            Self::InvalidInstanceState {
                instance_id,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Instance '{}' is in invalid state: expected '{}', got '{}'",
                    instance_id, expected, actual
                )
            }
            Self::Conflict {
                instance_id,
                revision,
            } => {
                write!(
                    f,
                    "Concurrent update conflict on instance '{}' at revision {}",
                    instance_id, revision
                )
            }
            Self::FieldNotFound { path } => {
                write!(f, "Variable path '{}' not found", path)
            }
            Self::Database { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
            Self::Serialization { details } => {
                write!(f, "State serialization failed: {}", details)
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Database {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization {
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_codes() {
        let id = Uuid::nil();
        let test_cases = vec![
            (
                EngineError::InstanceNotFound { instance_id: id },
                "INSTANCE_NOT_FOUND",
            ),
            (
                EngineError::DefinitionNotFound {
                    definition_id: "approval".to_string(),
                },
                "DEFINITION_NOT_FOUND",
            ),
            (
                EngineError::UnknownActivity {
                    kind: "Teleport".to_string(),
                },
                "UNKNOWN_ACTIVITY",
            ),
            (
                EngineError::InvalidInstanceState {
                    instance_id: id,
                    expected: "Suspended".to_string(),
                    actual: "Finished".to_string(),
                },
                "INVALID_INSTANCE_STATE",
            ),
            (
                EngineError::Conflict {
                    instance_id: id,
                    revision: 4,
                },
                "CONCURRENCY_CONFLICT",
            ),
            (
                EngineError::FieldNotFound {
                    path: "Document.Author.Name".to_string(),
                },
                "FIELD_NOT_FOUND",
            ),
            (
                EngineError::Database {
                    operation: "insert".to_string(),
                    details: "connection refused".to_string(),
                },
                "DATABASE_ERROR",
            ),
            (
                EngineError::Serialization {
                    details: "unexpected EOF".to_string(),
                },
                "SERIALIZATION_ERROR",
            ),
        ];

        for (error, expected_code) in test_cases {
            assert_eq!(error.error_code(), expected_code);
            // Every error renders a non-empty human message.
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_only_conflict_is_retryable() {
        assert!(
            EngineError::Conflict {
                instance_id: Uuid::nil(),
                revision: 0,
            }
            .is_retryable()
        );
        assert!(
            !EngineError::InstanceNotFound {
                instance_id: Uuid::nil(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_sqlx_error_maps_to_database() {
        let err: EngineError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.error_code(), "DATABASE_ERROR");
    }
}
