// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Structured logging bootstrap via `tracing-subscriber`.
//!
//! Peripheral to core semantics (§1), but every user-visible failure the
//! design calls for — claim conflicts, step failures, parse failures
//! (§7) — is logged through `tracing` rather than printed directly, so
//! it composes with whatever filter/format the operator configures via
//! `RUST_LOG`.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global `tracing` subscriber.
///
/// `verbosity` is the repeat count of `-v` on the CLI: 0 -> warn+info
/// default (`info` for `loom`, `warn` elsewhere), 1 -> debug, 2+ -> trace.
pub fn init(verbosity: u8) {
    let directive = match verbosity {
        0 => "warn,loom=info,loom_domain=info,loom_bootstrap=info",
        1 => "warn,loom=debug,loom_domain=debug,loom_bootstrap=debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    fmt().with_env_filter(filter).with_target(true).init();
}
