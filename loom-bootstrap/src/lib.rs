// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap Module
//!
//! Sits outside the domain/application/infrastructure layers and owns:
//!
//! - **CLI parsing** — `--project`, repeated `--step NAME[/k=v]...`
//! - **Signal handling** — SIGINT/SIGTERM (Unix), Ctrl-C elsewhere
//! - **Shutdown coordination** — a cancellation token threaded through the
//!   dispatcher's worker pools
//! - **Exit codes** — the CLI always returns 0 on quiescent termination
//!   (§7); non-zero is reserved for setup/transport failures that never
//!   reached the dispatch loop

pub mod cli;
pub mod exit_code;
pub mod logger;
pub mod shutdown;
pub mod signals;

pub use cli::{parse_and_validate, ParseError, StepSpec, ValidatedCli};
pub use exit_code::{map_error_to_exit_code, result_to_exit_code, ExitCode};
pub use shutdown::{CancellationToken, ShutdownCoordinator};

/// Bootstrap entry point: parse and validate CLI arguments.
pub fn bootstrap_cli() -> Result<ValidatedCli, ParseError> {
    cli::parse_and_validate()
}
