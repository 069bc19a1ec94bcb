//! CLI entry point for the parsnip parsimony tree search.
//!
//! Parses command-line arguments with clap, runs every input alignment
//! through the search, renders the trees to stdout, and maps errors to
//! appropriate exit codes. Logging is initialized eagerly so subsequent
//! operations can emit structured diagnostics via `tracing`.

use std::io::{self, BufWriter, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use parsnip_cli::{
    cli::{Cli, CliError, render_summary, run_cli},
    logging,
};
use tracing::{error, field};

/// Parse CLI arguments, run the search, render the trees, and flush the
/// output stream.
fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let summary = run_cli(cli).context("failed to execute command")?;
    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    render_summary(&summary, &mut writer).context("failed to render trees")?;
    writer.flush().context("failed to flush output")?;
    Ok(())
}

fn main() -> ExitCode {
    if let Err(err) = logging::init_logging() {
        writeln!(io::stderr(), "failed to initialise logging: {err}").ok();
        return ExitCode::FAILURE;
    }

    if let Err(err) = try_main() {
        let code = err
            .downcast_ref::<CliError>()
            .and_then(|cli_error| match cli_error {
                CliError::Search(search) => Some(field::display(search.code().as_str())),
                _ => None,
            });
        error!(error = %err, code, "command execution failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
