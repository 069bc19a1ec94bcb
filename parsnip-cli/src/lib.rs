//! Support library for the parsnip CLI binary.
//!
//! Re-exports the CLI modules so doctests and integration tests can exercise
//! the pipeline without forking a subprocess.

pub mod cli;
pub mod io;
pub mod logging;
