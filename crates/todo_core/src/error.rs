//! Error taxonomy presented by the persistence core.
//!
//! # Responsibility
//! - Classify store failures into the kinds callers act on.
//! - Keep the driver's batch failures distinct from point-operation errors.
//!
//! # Invariants
//! - Lower layers never swallow errors; they map and propagate.
//! - A partial procedure count is not an error and never appears here
//!   unless the round bound is exhausted.

use crate::config::ConfigError;
use crate::model::item::ItemValidationError;
use crate::store::{ProcedureError, StoreError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CoreResult<T> = Result<T, CoreError>;

/// Error kinds surfaced by resolver, accessor, registry and driver.
#[derive(Debug)]
pub enum CoreError {
    /// Missing or invalid setting. Fatal.
    Config(ConfigError),
    /// Transport, connection or storage failure. Not retried here.
    Connection(StoreError),
    /// Lookup miss on update/delete.
    NotFound(String),
    /// Database, collection or procedure creation failed for a reason other
    /// than "already exists".
    Install { resource: String, source: StoreError },
    /// Item rejected before any store call.
    Validation(ItemValidationError),
    /// Duplicate id on create, or the document changed between lookup and
    /// mutation.
    Conflict(String),
    /// A stored document could not be decoded.
    InvalidData(String),
    Batch(BatchError),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Connection(err) => write!(f, "store connection error: {err}"),
            Self::NotFound(id) => write!(f, "item not found: {id}"),
            Self::Install { resource, source } => {
                write!(f, "failed to install {resource}: {source}")
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::Conflict(id) => write!(f, "conflicting write for item: {id}"),
            Self::InvalidData(message) => write!(f, "invalid stored item: {message}"),
            Self::Batch(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Connection(err) => Some(err),
            Self::Install { source, .. } => Some(source),
            Self::Validation(err) => Some(err),
            Self::Batch(err) => Some(err),
            Self::NotFound(_) | Self::Conflict(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<ConfigError> for CoreError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<ItemValidationError> for CoreError {
    fn from(value: ItemValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<BatchError> for CoreError {
    fn from(value: BatchError) -> Self {
        Self::Batch(value)
    }
}

impl From<StoreError> for CoreError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(link) => Self::NotFound(link),
            StoreError::PreconditionFailed(link) => Self::Conflict(link),
            StoreError::InvalidData(message) => Self::InvalidData(message),
            other => Self::Connection(other),
        }
    }
}

/// Failure of a `mark_all_complete` run.
///
/// Replacements acknowledged before the failure stay completed; re-running
/// the operation is safe.
#[derive(Debug)]
pub enum BatchError {
    /// The procedure raised during an invocation.
    Procedure {
        completed_before: usize,
        source: ProcedureError,
    },
    /// The procedure reported a count outside `0..=submitted`.
    InvalidCount { submitted: usize, reported: String },
    /// The round bound ran out before the candidate set drained.
    RoundsExhausted {
        rounds: u32,
        completed: usize,
        remaining: usize,
    },
}

impl Display for BatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Procedure {
                completed_before,
                source,
            } => write!(
                f,
                "mark-all procedure failed after {completed_before} completions: {source}"
            ),
            Self::InvalidCount {
                submitted,
                reported,
            } => write!(
                f,
                "mark-all procedure reported `{reported}` for {submitted} submitted documents"
            ),
            Self::RoundsExhausted {
                rounds,
                completed,
                remaining,
            } => write!(
                f,
                "mark-all stopped after {rounds} rounds with {completed} completed and {remaining} remaining"
            ),
        }
    }
}

impl Error for BatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Procedure { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CoreError;
    use crate::store::StoreError;

    #[test]
    fn store_not_found_maps_to_not_found() {
        let err = CoreError::from(StoreError::NotFound("dbs/a/colls/b/docs/c".to_string()));
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn precondition_failure_maps_to_conflict() {
        let err = CoreError::from(StoreError::PreconditionFailed("x".to_string()));
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn transport_failures_map_to_connection() {
        let err = CoreError::from(StoreError::Unavailable("poisoned".to_string()));
        assert!(matches!(err, CoreError::Connection(_)));
        assert!(err.to_string().contains("poisoned"));
    }
}
