//! Search configuration and its validating builder.
//!
//! [`SearchConfig`] is a plain data struct read throughout the pipeline;
//! [`SearchConfigBuilder`] owns the defaults and rejects inconsistent
//! settings before a search starts.

use std::num::NonZeroUsize;

use thiserror::Error;

use crate::seq::SeqPolicy;

/// Which intermediate-selection strategy runs after each inference round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceStrategy {
    /// Keep every inferred candidate.
    None,
    /// Keep a random subset per node.
    Random,
    /// Prefer the largest mutation sets per node.
    BigSets,
    /// Prefer the sets with the biggest global cost decrease.
    BiggestCostDecrease,
}

/// How candidate trees are accepted against the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptanceMode {
    /// Accept only equal or better cost.
    Greedy,
    /// Metropolis rule with a self-calibrating temperature.
    Exponential,
    /// Metropolis rule whose target ratio tracks recent best costs.
    Adaptive,
}

/// Complete parameterisation of one search run.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Gap character in the input alignment.
    pub gap_char: u8,
    /// Character written over masked columns.
    pub mask_char: u8,
    /// Whether a gap mismatch counts as a substitution.
    pub count_gap_as_change: bool,
    /// Fewest columns masked per sampling round.
    pub masking_sites_min: usize,
    /// Most columns masked per sampling round.
    pub masking_sites_max: usize,
    /// Sampling rounds without improvement before a dataset finishes.
    pub sampling_iter_count: u32,
    /// Dataset workers running at once.
    pub thread_count: NonZeroUsize,
    /// Fraction of intermediates deleted when exploring alternatives.
    pub delete_int_coef: f64,
    /// Global cap on intermediates materialised per inference round.
    pub int_max_process: usize,
    /// Candidate-selection strategy.
    pub int_strategy: InferenceStrategy,
    /// Per-node keep budget as a multiple of the node degree.
    pub int_strategy_coefficient: f64,
    /// Chosen/inferred ratio at which selection degrades to `None`.
    pub int_strategy_threshold: f64,
    /// Minimum candidates kept per node regardless of degree.
    pub int_strategy_min_at_node: usize,
    /// Whether the local-topology filter screens candidates.
    pub int_filter_local_topology: bool,
    /// Entered/tree-size ratio below which the filter disables itself.
    pub int_filter_local_topology_threshold: f64,
    /// Population size above which Borůvka replaces Jarník–Prim.
    pub mst_implementation_threshold: usize,
    /// Smallest population for which tree repair pays off.
    pub repair_threshold_vertex_count: usize,
    /// Largest deleted fraction for which tree repair pays off.
    pub repair_threshold_deleted_part: f64,
    /// Use the O(V²) complete-graph engine instead of the others.
    pub use_prim_complete: bool,
    /// Acceptance mode for candidate trees.
    pub acceptance: AcceptanceMode,
    /// Initial desired acceptance ratio for the Metropolis modes.
    pub starting_acceptance_ratio: f64,
    /// Per-recalibration decay of the desired ratio.
    pub acceptance_ratio_decay: f64,
    /// Iteration at which the temperature first calibrates.
    pub calibration_iteration: u64,
    /// Iterations between recalibrations afterwards.
    pub const_beta_interval: u64,
    /// Seed the initial tree from the external neighbour-joining hook.
    pub init_tree_as_nj: bool,
    /// Refinement iterations granted to a seeded initial tree.
    pub init_tree_burn_in: u32,
    /// Extra initial iterations granted while the cost keeps dropping.
    pub init_tree_additional_max_iter: u32,
    /// Seed the first masked (temp) tree from the neighbour-joining hook.
    pub temp_tree_first_as_nj: bool,
    /// Iteration cap for each masked (temp) tree.
    pub temp_tree_max_iter: u32,
    /// Iterations granted to a masked tree after an improvement.
    pub temp_tree_iter: u32,
    /// Build combined trees from current and masked intermediates.
    pub compute_combined_tree: bool,
    /// Build the combined tree on masked sequences instead of originals.
    pub combined_tree_with_masking: bool,
    /// Iteration cap for each combined tree.
    pub combined_tree_max_iter: u32,
    /// Iterations granted to a combined tree after an improvement.
    pub combined_tree_iter: u32,
    /// Report the ancestral-state cost of the final tree.
    pub compute_final_ancestral_cost: bool,
    /// Memoise substitution counts per vertex pair.
    pub memoise_counts: bool,
    /// Seed for every random draw in the run.
    pub seed: u64,
}

impl SearchConfig {
    /// Starts a builder holding the default parameterisation.
    #[must_use]
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::default()
    }

    /// Character policy derived from the configuration.
    #[must_use]
    pub const fn policy(&self) -> SeqPolicy {
        SeqPolicy {
            gap: self.gap_char,
            mask: self.mask_char,
            gap_is_change: self.count_gap_as_change,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            gap_char: b'-',
            mask_char: b'*',
            count_gap_as_change: true,
            masking_sites_min: 10,
            masking_sites_max: 10,
            sampling_iter_count: 10,
            thread_count: NonZeroUsize::MIN,
            delete_int_coef: 0.1,
            int_max_process: 5000,
            int_strategy: InferenceStrategy::BiggestCostDecrease,
            int_strategy_coefficient: 4.0,
            int_strategy_threshold: 0.7,
            int_strategy_min_at_node: 1,
            int_filter_local_topology: true,
            int_filter_local_topology_threshold: 0.1,
            mst_implementation_threshold: 50,
            repair_threshold_vertex_count: 30,
            repair_threshold_deleted_part: 0.01,
            use_prim_complete: true,
            acceptance: AcceptanceMode::Greedy,
            starting_acceptance_ratio: 0.4,
            acceptance_ratio_decay: 0.02,
            calibration_iteration: 50,
            const_beta_interval: 200,
            init_tree_as_nj: true,
            init_tree_burn_in: 100,
            init_tree_additional_max_iter: 10,
            temp_tree_first_as_nj: false,
            temp_tree_max_iter: 0,
            temp_tree_iter: 0,
            compute_combined_tree: true,
            combined_tree_with_masking: false,
            combined_tree_max_iter: 4,
            combined_tree_iter: 2,
            compute_final_ancestral_cost: true,
            memoise_counts: true,
            seed: 123_456_789,
        }
    }
}

/// Errors raised by [`SearchConfigBuilder::build`].
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A fraction-valued knob fell outside `[0, 1]`.
    #[error("`{name}` must lie in [0, 1], got {value}")]
    FractionOutOfRange {
        /// Offending knob.
        name: &'static str,
        /// Supplied value.
        value: f64,
    },
    /// The masking range is empty.
    #[error("masking range {min}..={max} is empty")]
    EmptyMaskingRange {
        /// Lower bound.
        min: usize,
        /// Upper bound.
        max: usize,
    },
    /// The starting acceptance ratio must be positive.
    #[error("starting acceptance ratio must be positive, got {value}")]
    NonPositiveRatio {
        /// Supplied value.
        value: f64,
    },
    /// Gap and mask characters must differ.
    #[error("gap and mask characters are both `{ch}`")]
    GapMaskClash {
        /// The shared character.
        ch: char,
    },
}

/// Validating builder for [`SearchConfig`].
///
/// # Examples
/// ```
/// use parsnip_core::config::{AcceptanceMode, SearchConfig};
///
/// let config = SearchConfig::builder()
///     .with_acceptance(AcceptanceMode::Exponential)
///     .with_seed(42)
///     .build()
///     .expect("defaults with a new seed are valid");
/// assert_eq!(config.seed, 42);
/// ```
#[derive(Debug, Default)]
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    /// Sets the gap and mask characters.
    #[must_use]
    pub const fn with_characters(mut self, gap: u8, mask: u8) -> Self {
        self.config.gap_char = gap;
        self.config.mask_char = mask;
        self
    }

    /// Sets whether gap mismatches count as substitutions.
    #[must_use]
    pub const fn with_gap_as_change(mut self, flag: bool) -> Self {
        self.config.count_gap_as_change = flag;
        self
    }

    /// Sets the masked-column range per sampling round.
    #[must_use]
    pub const fn with_masking_sites(mut self, min: usize, max: usize) -> Self {
        self.config.masking_sites_min = min;
        self.config.masking_sites_max = max;
        self
    }

    /// Sets the number of sampling rounds without improvement.
    #[must_use]
    pub const fn with_sampling_iterations(mut self, count: u32) -> Self {
        self.config.sampling_iter_count = count;
        self
    }

    /// Sets the number of dataset workers.
    #[must_use]
    pub const fn with_threads(mut self, threads: NonZeroUsize) -> Self {
        self.config.thread_count = threads;
        self
    }

    /// Sets the fraction of intermediates deleted during exploration.
    #[must_use]
    pub const fn with_delete_coefficient(mut self, coef: f64) -> Self {
        self.config.delete_int_coef = coef;
        self
    }

    /// Sets the inference strategy and its tuning knobs.
    #[must_use]
    pub const fn with_inference(
        mut self,
        strategy: InferenceStrategy,
        coefficient: f64,
        threshold: f64,
        min_at_node: usize,
    ) -> Self {
        self.config.int_strategy = strategy;
        self.config.int_strategy_coefficient = coefficient;
        self.config.int_strategy_threshold = threshold;
        self.config.int_strategy_min_at_node = min_at_node;
        self
    }

    /// Caps the intermediates materialised per round.
    #[must_use]
    pub const fn with_max_intermediates(mut self, cap: usize) -> Self {
        self.config.int_max_process = cap;
        self
    }

    /// Enables or disables the local-topology filter.
    #[must_use]
    pub const fn with_local_topology_filter(mut self, enabled: bool, threshold: f64) -> Self {
        self.config.int_filter_local_topology = enabled;
        self.config.int_filter_local_topology_threshold = threshold;
        self
    }

    /// Chooses between the complete-graph engine and the threshold pair.
    #[must_use]
    pub const fn with_mst_engines(
        mut self,
        use_prim_complete: bool,
        implementation_threshold: usize,
    ) -> Self {
        self.config.use_prim_complete = use_prim_complete;
        self.config.mst_implementation_threshold = implementation_threshold;
        self
    }

    /// Sets the repair gating thresholds.
    #[must_use]
    pub const fn with_repair_thresholds(mut self, vertex_count: usize, deleted_part: f64) -> Self {
        self.config.repair_threshold_vertex_count = vertex_count;
        self.config.repair_threshold_deleted_part = deleted_part;
        self
    }

    /// Sets the acceptance mode.
    #[must_use]
    pub const fn with_acceptance(mut self, mode: AcceptanceMode) -> Self {
        self.config.acceptance = mode;
        self
    }

    /// Tunes the Metropolis calibration schedule.
    #[must_use]
    pub const fn with_acceptance_schedule(
        mut self,
        starting_ratio: f64,
        decay: f64,
        calibration_iteration: u64,
        const_beta_interval: u64,
    ) -> Self {
        self.config.starting_acceptance_ratio = starting_ratio;
        self.config.acceptance_ratio_decay = decay;
        self.config.calibration_iteration = calibration_iteration;
        self.config.const_beta_interval = const_beta_interval;
        self
    }

    /// Controls neighbour-joining seeding of the initial tree.
    #[must_use]
    pub const fn with_nj_seeding(mut self, enabled: bool, burn_in: u32, additional: u32) -> Self {
        self.config.init_tree_as_nj = enabled;
        self.config.init_tree_burn_in = burn_in;
        self.config.init_tree_additional_max_iter = additional;
        self
    }

    /// Offers the first masked tree to the neighbour-joining hook.
    #[must_use]
    pub const fn with_nj_first_temp_tree(mut self, enabled: bool) -> Self {
        self.config.temp_tree_first_as_nj = enabled;
        self
    }

    /// Sets the masked-tree iteration budgets.
    #[must_use]
    pub const fn with_temp_tree_budget(mut self, max_iter: u32, window: u32) -> Self {
        self.config.temp_tree_max_iter = max_iter;
        self.config.temp_tree_iter = window;
        self
    }

    /// Controls combined-tree construction.
    #[must_use]
    pub const fn with_combined_tree(
        mut self,
        enabled: bool,
        with_masking: bool,
        max_iter: u32,
        window: u32,
    ) -> Self {
        self.config.compute_combined_tree = enabled;
        self.config.combined_tree_with_masking = with_masking;
        self.config.combined_tree_max_iter = max_iter;
        self.config.combined_tree_iter = window;
        self
    }

    /// Enables the final ancestral-state cost report.
    #[must_use]
    pub const fn with_final_ancestral_cost(mut self, enabled: bool) -> Self {
        self.config.compute_final_ancestral_cost = enabled;
        self
    }

    /// Sets the run seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] describing the first inconsistent setting.
    pub fn build(self) -> Result<SearchConfig, ConfigError> {
        let c = self.config;
        if c.gap_char == c.mask_char {
            return Err(ConfigError::GapMaskClash {
                ch: c.gap_char as char,
            });
        }
        if c.masking_sites_min > c.masking_sites_max || c.masking_sites_max == 0 {
            return Err(ConfigError::EmptyMaskingRange {
                min: c.masking_sites_min,
                max: c.masking_sites_max,
            });
        }
        for (name, value) in [
            ("delete_int_coef", c.delete_int_coef),
            ("int_strategy_threshold", c.int_strategy_threshold),
            (
                "int_filter_local_topology_threshold",
                c.int_filter_local_topology_threshold,
            ),
            ("repair_threshold_deleted_part", c.repair_threshold_deleted_part),
            ("acceptance_ratio_decay", c.acceptance_ratio_decay),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::FractionOutOfRange { name, value });
            }
        }
        if c.starting_acceptance_ratio <= 0.0 || c.starting_acceptance_ratio > 1.0 {
            return Err(ConfigError::NonPositiveRatio {
                value: c.starting_acceptance_ratio,
            });
        }
        Ok(c)
    }
}
