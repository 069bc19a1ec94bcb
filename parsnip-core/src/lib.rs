//! Maximum-parsimony phylogenetic tree search.
//!
//! The crate grows a tree over aligned nucleotide sequences by repeatedly
//! building minimum spanning trees over a substitution-count matrix,
//! inferring intermediate (ancestral) sequences from the mutation sets on
//! the edges, and judging rebuilt candidates with a self-calibrating
//! Metropolis acceptance rule. A sampling phase masks recurrent columns to
//! escape local minima before the tree is cleaned up and reported.
//!
//! [`Search`] is the entry point: feed it [`Dataset`]s and a validated
//! [`SearchConfig`], optionally wire in a [`TreeSeeder`] for the initial
//! topology, and collect [`SearchOutcome`]s.

pub mod accept;
pub mod arena;
pub mod config;
pub mod error;
pub mod fitch;
pub mod gaps;
pub mod infer;
pub mod matrix;
pub mod mst;
pub mod mutation;
pub mod pool;
pub mod sampling;
pub mod search;
pub mod seq;
pub mod tree;

pub use crate::{
    config::{AcceptanceMode, ConfigError, InferenceStrategy, SearchConfig, SearchConfigBuilder},
    error::{Result, SearchError, SearchErrorCode},
    search::{Dataset, ExportNode, Search, SearchOutcome, TreeSeeder},
};
