//! Error taxonomy for the tool layer.
//!
//! Every tool returns a structured JSON result; domain failures serialize as
//! `{"error": kind, "detail": message, ...}` objects rather than protocol
//! errors, so callers can branch on the `error` field programmatically.

use serde_json::{json, Value};
use thiserror::Error;

use crate::graph::store::StoreError;

/// A failure surfaced to a tool-protocol client.
#[derive(Debug, Error)]
pub enum ToolError {
    /// One or more referenced entity names do not resolve. The whole call
    /// is rejected before any write.
    #[error("missing entities: {}", names.join(", "))]
    MissingEntities { names: Vec<String> },

    /// A name collision where the operation does not tolerate one.
    #[error("entity already exists: {name}")]
    AlreadyExists { name: String },

    /// A single-target operation addressed a missing entity or relation.
    #[error("not found: {name}")]
    NotFound { name: String },

    /// Validation failure. Never recovered.
    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },

    /// The embedding provider failed or is not configured.
    #[error("embedding provider unavailable: {detail}")]
    ProviderUnavailable { detail: String },

    /// Lock contention outlasted the busy timeout, even after a retry.
    #[error("storage contention: {detail}")]
    Conflict { detail: String },

    /// Anything else. Logged with full context, surfaced redacted.
    #[error("internal error: {detail}")]
    Internal { detail: String },
}

impl ToolError {
    /// Stable kind discriminant carried in the `error` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingEntities { .. } => "MissingEntities",
            Self::AlreadyExists { .. } => "AlreadyExists",
            Self::NotFound { .. } => "NotFound",
            Self::Invalid { .. } => "Invalid",
            Self::ProviderUnavailable { .. } => "ProviderUnavailable",
            Self::Conflict { .. } => "Conflict",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Serialize to the wire shape: `error`, `detail`, plus kind-specific fields.
    pub fn to_value(&self) -> Value {
        let mut v = json!({
            "error": self.kind(),
            "detail": self.to_string(),
        });
        match self {
            Self::MissingEntities { names } => {
                v["names"] = json!(names);
            }
            Self::AlreadyExists { name } | Self::NotFound { name } => {
                v["name"] = json!(name);
            }
            Self::Invalid { field, reason } => {
                v["field"] = json!(field);
                v["reason"] = json!(reason);
            }
            _ => {}
        }
        v
    }

    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(detail: impl ToString) -> Self {
        Self::Internal {
            detail: detail.to_string(),
        }
    }
}

impl From<StoreError> for ToolError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AlreadyExists(name) => Self::AlreadyExists { name },
            StoreError::NotFound(name) => Self::NotFound { name },
            StoreError::EmptyField(field) => Self::Invalid {
                field,
                reason: "must not be empty".into(),
            },
            StoreError::Sqlite(err) if is_busy(&err) => Self::Conflict {
                detail: err.to_string(),
            },
            StoreError::Sqlite(err) => Self::Internal {
                detail: err.to_string(),
            },
            StoreError::Corrupt(detail) => Self::Internal { detail },
        }
    }
}

impl From<rusqlite::Error> for ToolError {
    fn from(e: rusqlite::Error) -> Self {
        if is_busy(&e) {
            Self::Conflict {
                detail: e.to_string(),
            }
        } else {
            Self::Internal {
                detail: e.to_string(),
            }
        }
    }
}

/// True when the underlying SQLite error is lock contention that outlasted
/// the busy timeout.
pub fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}
