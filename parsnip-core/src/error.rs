//! Error types shared across the search pipeline.
//!
//! Every public error carries a machine-readable code so callers can branch
//! on failure classes without string matching. Invariant violations abort the
//! current dataset only; the orchestrator reports them and moves on.

use thiserror::Error;

use crate::config::ConfigError;
use crate::mst::MstError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors raised while building or refining a parsimony tree.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SearchError {
    /// The dataset contained no sequences.
    #[error("dataset `{name}` contains no sequences")]
    EmptyDataset {
        /// Dataset identifier.
        name: String,
    },
    /// Sequences in one dataset must share a common length.
    #[error("dataset `{name}`: sequence `{taxon}` has length {got}, expected {expected}")]
    LengthMismatch {
        /// Dataset identifier.
        name: String,
        /// Offending taxon name.
        taxon: String,
        /// Observed length.
        got: usize,
        /// Length of the first sequence.
        expected: usize,
    },
    /// The distance matrix has no row for the requested vertex.
    #[error("distance matrix has no entry for vertex {id}")]
    UnknownVertex {
        /// Vertex identifier missing from the index.
        id: u32,
    },
    /// A vertex may carry at most one incoming edge.
    #[error("vertex {id} already has an incoming edge")]
    IncomingEdgeTaken {
        /// Vertex whose parent link was already set.
        id: u32,
    },
    /// Attempted to remove a parent/child link that does not exist.
    #[error("vertex {parent} has no child {child}")]
    MissingChildLink {
        /// Parent vertex identifier.
        parent: u32,
        /// Child vertex identifier.
        child: u32,
    },
    /// An arena slot was referenced after its vertex had been removed.
    #[error("arena slot {slot} is vacant")]
    VacantSlot {
        /// Offending slot index.
        slot: usize,
    },
    /// Two observed sequences collapsed onto each other during cleanup.
    #[error("observed sequence `{name}` duplicates `{other}` after cleanup")]
    ObservedCollapsed {
        /// Taxon that was about to be dropped.
        name: String,
        /// Taxon it duplicates.
        other: String,
    },
    /// A shared buffer pool lock was poisoned by a panicking worker.
    #[error("buffer pool lock poisoned")]
    PoolPoisoned,
    /// A dataset worker thread panicked.
    #[error("worker thread for dataset `{name}` panicked")]
    WorkerPanicked {
        /// Dataset the worker was processing.
        name: String,
    },
    /// Spanning-tree construction failed.
    #[error(transparent)]
    Mst(#[from] MstError),
    /// Configuration validation failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Stable identifiers for [`SearchError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SearchErrorCode {
    /// See [`SearchError::EmptyDataset`].
    EmptyDataset,
    /// See [`SearchError::LengthMismatch`].
    LengthMismatch,
    /// See [`SearchError::UnknownVertex`].
    UnknownVertex,
    /// See [`SearchError::IncomingEdgeTaken`].
    IncomingEdgeTaken,
    /// See [`SearchError::MissingChildLink`].
    MissingChildLink,
    /// See [`SearchError::VacantSlot`].
    VacantSlot,
    /// See [`SearchError::ObservedCollapsed`].
    ObservedCollapsed,
    /// See [`SearchError::PoolPoisoned`].
    PoolPoisoned,
    /// See [`SearchError::WorkerPanicked`].
    WorkerPanicked,
    /// See [`SearchError::Mst`].
    Mst,
    /// See [`SearchError::Config`].
    Config,
}

impl SearchErrorCode {
    /// Returns the snake_case identifier used in logs and tooling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmptyDataset => "empty_dataset",
            Self::LengthMismatch => "length_mismatch",
            Self::UnknownVertex => "unknown_vertex",
            Self::IncomingEdgeTaken => "incoming_edge_taken",
            Self::MissingChildLink => "missing_child_link",
            Self::VacantSlot => "vacant_slot",
            Self::ObservedCollapsed => "observed_collapsed",
            Self::PoolPoisoned => "pool_poisoned",
            Self::WorkerPanicked => "worker_panicked",
            Self::Mst => "mst",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for SearchErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SearchError {
    /// Maps the error to its stable code.
    #[must_use]
    pub const fn code(&self) -> SearchErrorCode {
        match self {
            Self::EmptyDataset { .. } => SearchErrorCode::EmptyDataset,
            Self::LengthMismatch { .. } => SearchErrorCode::LengthMismatch,
            Self::UnknownVertex { .. } => SearchErrorCode::UnknownVertex,
            Self::IncomingEdgeTaken { .. } => SearchErrorCode::IncomingEdgeTaken,
            Self::MissingChildLink { .. } => SearchErrorCode::MissingChildLink,
            Self::VacantSlot { .. } => SearchErrorCode::VacantSlot,
            Self::ObservedCollapsed { .. } => SearchErrorCode::ObservedCollapsed,
            Self::PoolPoisoned => SearchErrorCode::PoolPoisoned,
            Self::WorkerPanicked { .. } => SearchErrorCode::WorkerPanicked,
            Self::Mst(_) => SearchErrorCode::Mst,
            Self::Config(_) => SearchErrorCode::Config,
        }
    }
}
