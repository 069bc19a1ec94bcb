//! Command-line interface orchestration.
//!
//! The CLI reads one or more alignment files, maps the flags onto a
//! validated search configuration, runs every dataset through the search,
//! and renders the resulting trees as Newick on stdout.

use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use parsnip_core::{
    AcceptanceMode, ConfigError, InferenceStrategy, Search, SearchConfig, SearchError,
    SearchOutcome,
};

use crate::io::{IoError, read_dataset, write_newick};

/// Top-level CLI options parsed by [`clap`].
#[derive(Debug, Parser, Clone)]
#[command(name = "parsnip", about = "Build maximum-parsimony phylogenies from aligned sequences.")]
pub struct Cli {
    /// Alignment files, FASTA or `name sequence` lines.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Seed for every random draw in the run.
    #[arg(long, default_value_t = 123_456_789)]
    pub seed: u64,

    /// Datasets processed in parallel.
    #[arg(long, default_value_t = NonZeroUsize::MIN)]
    pub threads: NonZeroUsize,

    /// How candidate trees are accepted against the current one.
    #[arg(long, value_enum, default_value_t = AcceptanceArg::Greedy)]
    pub acceptance: AcceptanceArg,

    /// Which inferred intermediates each round keeps.
    #[arg(long, value_enum, default_value_t = StrategyArg::BiggestCostDecrease)]
    pub strategy: StrategyArg,

    /// Fewest columns masked per sampling round.
    #[arg(long, default_value_t = 10)]
    pub masking_min: usize,

    /// Most columns masked per sampling round.
    #[arg(long, default_value_t = 10)]
    pub masking_max: usize,

    /// Sampling rounds without improvement before a dataset finishes.
    #[arg(long, default_value_t = 10)]
    pub sampling_iterations: u32,

    /// Skip the combined-tree pass of each sampling round.
    #[arg(long)]
    pub no_combined_tree: bool,

    /// Skip the final ancestral-cost report.
    #[arg(long)]
    pub no_ancestral_cost: bool,
}

/// Acceptance rules selectable from the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AcceptanceArg {
    /// Accept only equal or better cost.
    Greedy,
    /// Metropolis rule with a self-calibrating temperature.
    Exponential,
    /// Metropolis rule whose target ratio tracks recent best costs.
    Adaptive,
}

impl From<AcceptanceArg> for AcceptanceMode {
    fn from(arg: AcceptanceArg) -> Self {
        match arg {
            AcceptanceArg::Greedy => Self::Greedy,
            AcceptanceArg::Exponential => Self::Exponential,
            AcceptanceArg::Adaptive => Self::Adaptive,
        }
    }
}

/// Intermediate-selection strategies selectable from the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    /// Keep every inferred candidate.
    None,
    /// Keep a random subset per node.
    Random,
    /// Prefer the largest mutation sets per node.
    BigSets,
    /// Prefer the sets with the biggest global cost decrease.
    BiggestCostDecrease,
}

impl From<StrategyArg> for InferenceStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::None => Self::None,
            StrategyArg::Random => Self::Random,
            StrategyArg::BigSets => Self::BigSets,
            StrategyArg::BiggestCostDecrease => Self::BiggestCostDecrease,
        }
    }
}

/// Errors surfaced while executing CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Loading an alignment failed.
    #[error(transparent)]
    Io(#[from] IoError),
    /// The flag combination does not form a valid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The search itself failed.
    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Trees produced by one CLI invocation.
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    /// One outcome per input dataset, in input order.
    pub outcomes: Vec<SearchOutcome>,
}

/// Maps the parsed flags onto a validated configuration.
///
/// # Errors
/// Returns [`ConfigError`] when the flags are inconsistent.
pub fn build_config(cli: &Cli) -> Result<SearchConfig, ConfigError> {
    let defaults = SearchConfig::default();
    SearchConfig::builder()
        .with_seed(cli.seed)
        .with_threads(cli.threads)
        .with_acceptance(cli.acceptance.into())
        .with_inference(
            cli.strategy.into(),
            defaults.int_strategy_coefficient,
            defaults.int_strategy_threshold,
            defaults.int_strategy_min_at_node,
        )
        .with_masking_sites(cli.masking_min, cli.masking_max)
        .with_sampling_iterations(cli.sampling_iterations)
        .with_combined_tree(
            !cli.no_combined_tree,
            defaults.combined_tree_with_masking,
            defaults.combined_tree_max_iter,
            defaults.combined_tree_iter,
        )
        .with_final_ancestral_cost(!cli.no_ancestral_cost)
        .build()
}

/// Executes the CLI invocation represented by `cli`.
///
/// # Errors
/// Returns [`CliError`] when loading, configuration, or the search fails.
pub fn run_cli(cli: Cli) -> Result<ExecutionSummary, CliError> {
    let config = build_config(&cli)?;
    let datasets = cli
        .inputs
        .iter()
        .map(|path| read_dataset(path))
        .collect::<Result<Vec<_>, _>>()?;
    let mut outcomes = Vec::with_capacity(datasets.len());
    for result in Search::new(config).run(datasets) {
        outcomes.push(result?);
    }
    Ok(ExecutionSummary { outcomes })
}

/// Renders every tree with a one-line summary header.
///
/// # Errors
/// Propagates write failures.
pub fn render_summary<W: Write>(summary: &ExecutionSummary, writer: &mut W) -> io::Result<()> {
    for outcome in &summary.outcomes {
        write!(
            writer,
            "# {} cost={} vertices={}",
            outcome.dataset, outcome.cost, outcome.vertex_count
        )?;
        if let Some(ancestral) = outcome.ancestral_cost {
            write!(writer, " ancestral_cost={ancestral}")?;
        }
        writeln!(writer)?;
        write_newick(writer, &outcome.tree)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write as _;

    use tempfile::NamedTempFile;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("arguments parse")
    }

    #[test]
    fn flags_map_onto_the_configuration() {
        let cli = parse(&[
            "parsnip",
            "--seed",
            "7",
            "--acceptance",
            "exponential",
            "--strategy",
            "big-sets",
            "--masking-min",
            "2",
            "--masking-max",
            "4",
            "--no-combined-tree",
            "in.fa",
        ]);
        let config = build_config(&cli).expect("valid flags");
        assert_eq!(config.seed, 7);
        assert_eq!(config.acceptance, AcceptanceMode::Exponential);
        assert_eq!(config.int_strategy, InferenceStrategy::BigSets);
        assert_eq!(config.masking_sites_min, 2);
        assert_eq!(config.masking_sites_max, 4);
        assert!(!config.compute_combined_tree);
        assert!(config.compute_final_ancestral_cost);
    }

    #[test]
    fn inconsistent_masking_range_is_a_config_error() {
        let cli = parse(&["parsnip", "--masking-min", "5", "--masking-max", "2", "in.fa"]);
        let err = build_config(&cli).expect_err("range is empty");
        assert!(matches!(err, ConfigError::EmptyMaskingRange { min: 5, max: 2 }));
    }

    #[test]
    fn run_cli_builds_and_renders_a_tree() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, ">a\nACGTACGT\n>b\nACCTACGT\n>c\nACCTACGA\n>d\nTCGTACGT")
            .expect("write alignment");
        let path = file.path().to_string_lossy().into_owned();
        let cli = parse(&[
            "parsnip",
            "--seed",
            "11",
            "--masking-min",
            "1",
            "--masking-max",
            "2",
            "--sampling-iterations",
            "1",
            &path,
        ]);
        let summary = run_cli(cli).expect("search succeeds");
        assert_eq!(summary.outcomes.len(), 1);

        let mut rendered = Vec::new();
        render_summary(&summary, &mut rendered).expect("render to vec");
        let text = String::from_utf8(rendered).expect("utf8 output");
        assert!(text.starts_with("# "));
        assert!(text.trim_end().ends_with(';'));
        for taxon in ["a", "b", "c", "d"] {
            assert!(text.contains(taxon));
        }
    }

    #[test]
    fn missing_input_file_is_an_io_error() {
        let cli = parse(&["parsnip", "/definitely/not/here.fa"]);
        let err = run_cli(cli).expect_err("file is missing");
        assert!(matches!(err, CliError::Io(IoError::Read { .. })));
    }
}
