//! Error types for graph operations and evaluation.

use std::sync::Arc;

use thiserror::Error;

use crate::graph::{CellKey, CellKind};

/// Result type used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Errors raised by the runtime.
///
/// The enum is `Clone` so one observer failure can be handed to its error
/// handler and recorded in the [`FlushReport`](crate::reactive::FlushReport).
#[derive(Debug, Clone, Error)]
pub enum ReactiveError {
    /// Evaluation re-entered a cell that was already being evaluated.
    ///
    /// `path` starts and ends with the same key.
    #[error("dependency cycle detected: {}", join_keys(.path))]
    Cycle { path: Vec<CellKey> },

    /// `write` was called on a derived or observer cell.
    #[error("cannot write to {key}: it is a {kind} cell, not a source")]
    NotASource { key: CellKey, kind: CellKind },

    /// A compute-only operation was called on a source cell.
    #[error("{key} is a source cell and has no compute function")]
    NotComputed { key: CellKey },

    /// `remove` was called on a cell that other cells still read.
    #[error("cannot remove {key}: still read by {}", join_keys(.dependents))]
    DanglingDependency {
        key: CellKey,
        dependents: Vec<CellKey>,
    },

    /// The key does not name a live cell, usually because it was removed.
    #[error("unknown cell {key}")]
    UnknownCell { key: CellKey },

    /// A user-supplied compute function failed.
    #[error("compute failed for {key}: {error:#}")]
    Compute {
        key: CellKey,
        error: Arc<anyhow::Error>,
    },

    /// Nested evaluation went deeper than the configured limit and the
    /// cells below could not be evaluated bottom-up instead.
    #[error("evaluation of {key} exceeded the maximum depth of {limit}")]
    DepthExceeded { key: CellKey, limit: usize },

    /// `end_batch` was called without a matching `begin_batch`.
    #[error("end_batch called without an active batch")]
    NoActiveBatch,
}

impl ReactiveError {
    /// The cell this error is about, if any.
    ///
    /// For cycles this is the cell whose re-entry closed the cycle.
    pub fn key(&self) -> Option<CellKey> {
        match self {
            ReactiveError::Cycle { path } => path.last().copied(),
            ReactiveError::NotASource { key, .. }
            | ReactiveError::NotComputed { key }
            | ReactiveError::DanglingDependency { key, .. }
            | ReactiveError::UnknownCell { key }
            | ReactiveError::Compute { key, .. }
            | ReactiveError::DepthExceeded { key, .. } => Some(*key),
            ReactiveError::NoActiveBatch => None,
        }
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self, ReactiveError::Cycle { .. })
    }

    /// Returns the user error if this is a `Compute` variant.
    pub fn compute_error(&self) -> Option<&anyhow::Error> {
        match self {
            ReactiveError::Compute { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Attempts to downcast a compute failure to a specific user error type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        self.compute_error().and_then(|e| e.downcast_ref::<E>())
    }

    /// Wrap an error returned by a compute function.
    ///
    /// Errors that already are `ReactiveError`s (a cycle, or a failed
    /// upstream read propagated with `?`) pass through unchanged so the
    /// caller learns which cell actually failed.
    pub(crate) fn from_compute(key: CellKey, error: anyhow::Error) -> Self {
        match error.downcast::<ReactiveError>() {
            Ok(inner) => inner,
            Err(error) => ReactiveError::Compute {
                key,
                error: Arc::new(error),
            },
        }
    }
}

fn join_keys(keys: &[CellKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("bad row {0}")]
    struct BadRow(usize);

    #[test]
    fn cycle_message_lists_path() {
        let a = CellKey::next();
        let b = CellKey::next();
        let err = ReactiveError::Cycle {
            path: vec![a, b, a],
        };
        assert_eq!(
            err.to_string(),
            format!("dependency cycle detected: {a} -> {b} -> {a}")
        );
        assert!(err.is_cycle());
        assert_eq!(err.key(), Some(a));
    }

    #[test]
    fn user_errors_are_wrapped() {
        let key = CellKey::next();
        let err = ReactiveError::from_compute(key, anyhow::Error::new(BadRow(3)));

        assert_eq!(err.key(), Some(key));
        assert_eq!(err.downcast_ref::<BadRow>().map(|e| e.0), Some(3));
        assert!(err.to_string().contains("bad row 3"));
    }

    #[test]
    fn reactive_errors_pass_through() {
        let origin = CellKey::next();
        let reader = CellKey::next();
        let inner = ReactiveError::UnknownCell { key: origin };

        let err = ReactiveError::from_compute(reader, anyhow::Error::new(inner));
        assert!(matches!(err, ReactiveError::UnknownCell { key } if key == origin));
    }

    #[test]
    fn context_keeps_reactive_error_downcastable() {
        let a = CellKey::next();
        let reader = CellKey::next();
        let inner = ReactiveError::Cycle { path: vec![a, a] };
        let wrapped = anyhow::Error::new(inner).context("while loading sales table");

        let err = ReactiveError::from_compute(reader, wrapped);
        assert!(err.is_cycle());
    }
}
