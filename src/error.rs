// ⚠️ Error Types - typed failures for the inventory graph and the XML codec
//
// Nothing in the core retries or swallows these. Every failure reaches the
// caller as one of the variants below.

use crate::entities::{EntityId, Violation};
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// GRAPH ERRORS
// ============================================================================

/// Failures of the query/mutation API. All of them leave the graph unchanged.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The identifier does not name a live entity (or names the wrong kind).
    #[error("entity {0} not found")]
    NotFound(EntityId),

    /// The mutation would break a structural or cross-entity invariant.
    #[error("constraint violation: {}", join(.violations))]
    ConstraintViolation { violations: Vec<Violation> },

    /// Removal blocked because streams still point at this equipment.
    #[error("entity {id} is still referenced by {} stream(s)", .streams.len())]
    ReferencedEntity { id: EntityId, streams: Vec<EntityId> },

    /// A stream points at equipment that is not in the catalog.
    #[error("stream {stream} references unknown equipment '{reference}'")]
    DanglingReference { stream: EntityId, reference: String },
}

impl InventoryError {
    pub fn violation(violation: Violation) -> Self {
        InventoryError::ConstraintViolation {
            violations: vec![violation],
        }
    }
}

fn join(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// CODEC ERRORS
// ============================================================================

/// Failures of XML decode/encode and of file load/save.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Unparsable XML. Fatal to the load.
    #[error("malformed document at line {line}, column {column}: {message}")]
    MalformedDocument {
        line: usize,
        column: usize,
        message: String,
    },

    /// A recognised element is missing a required field or has a mistyped one.
    /// The whole load is aborted.
    #[error("schema violation in <{element}>: {message}")]
    SchemaViolation { element: String, message: String },

    #[error("I/O failure on {}: {source}", .path.display())]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Encoder found graph state it cannot account for (e.g. orphaned
    /// extension data). Always a programming error.
    #[error("internal codec error: {0}")]
    Internal(String),
}

impl CodecError {
    pub(crate) fn schema(element: &str, message: impl Into<String>) -> Self {
        CodecError::SchemaViolation {
            element: element.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CodecError::IoFailure {
            path: path.into(),
            source,
        }
    }
}

// Writes go to an in-memory buffer, so a failing write is an encoder bug.
impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::Internal(format!("write failed: {}", err))
    }
}

impl From<quick_xml::Error> for CodecError {
    fn from(err: quick_xml::Error) -> Self {
        CodecError::Internal(format!("xml writer failed: {}", err))
    }
}
