// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface Module
//!
//! Bootstrap-layer CLI handling (§4.6, §6 "CLI").
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  1. clap::Parser::parse()            │  Parse fixed flags
//! └─────────────────┬─────────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  2. parse_step_spec() per --step    │  NAME[/k=v]... grammar
//! └─────────────────┬─────────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  3. ValidatedCli                     │  ready for the dispatcher
//! └─────────────────────────────────────┘
//! ```
//!
//! `--step` values use a grammar clap's derive macros cannot express
//! (`NAME[/key=value]...` with `//` as an escaped literal slash), so each
//! occurrence is collected as a raw string and parsed by
//! [`parse_step_spec`].

use clap::Parser;
use loom_domain::StepParams;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("--step value `{raw}` is empty")]
    EmptyStep { raw: String },
    #[error("--step `{raw}`: parameter segment `{segment}` is missing `=`")]
    MissingEquals { raw: String, segment: String },
    #[error("--step `{raw}`: parameter segment `{segment}` has an empty key")]
    EmptyKey { raw: String, segment: String },
    #[error("--small-delay-ms / --big-delay-ms must both be > 0")]
    InvalidDelay,
}

#[derive(Debug, Parser)]
#[command(name = "loom", about = "Drive a content-addressed pipeline to completion")]
struct RawCli {
    /// Project name; the store file is `<project>.db`.
    #[arg(long)]
    project: String,

    /// Register a step instance: `NAME[/key=value]...`. Repeatable; the
    /// same NAME may be given more than once to instantiate parallel
    /// variants writing to different outkeys.
    #[arg(long = "step", required = true)]
    steps: Vec<String>,

    /// Sleep between dispatcher passes that submitted work (ms).
    #[arg(long, default_value_t = 200)]
    small_delay_ms: u64,

    /// Sleep between dispatcher passes waiting on in-flight work (ms).
    #[arg(long, default_value_t = 2000)]
    big_delay_ms: u64,

    /// Delete claim sentinels older than this many seconds on startup
    /// (the "claim recovery" sweep, §4.3). Omit to skip the sweep.
    #[arg(long = "claim-ttl")]
    claim_ttl_secs: Option<i64>,

    /// Increase log verbosity; may be repeated (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// One `--step` occurrence, parsed and ready to bind against a registered
/// prototype.
#[derive(Debug, Clone)]
pub struct StepSpec {
    pub name: String,
    pub params: StepParams,
}

#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub project: String,
    pub steps: Vec<StepSpec>,
    pub small_delay_ms: u64,
    pub big_delay_ms: u64,
    pub claim_ttl_secs: Option<i64>,
    pub verbose: u8,
}

/// Split `raw` on `/`, treating `//` as an escaped literal `/` (§6).
fn split_escaped(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '/' {
            if chars.peek() == Some(&'/') {
                chars.next();
                current.push('/');
            } else {
                parts.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

/// Parse one `--step` value into a [`StepSpec`].
pub fn parse_step_spec(raw: &str) -> Result<StepSpec, ParseError> {
    let segments = split_escaped(raw);
    let mut iter = segments.into_iter();
    let name = iter.next().filter(|s| !s.is_empty()).ok_or_else(|| ParseError::EmptyStep { raw: raw.to_string() })?;

    let mut params = StepParams::new();
    for segment in iter {
        let (key, value) = segment
            .split_once('=')
            .ok_or_else(|| ParseError::MissingEquals { raw: raw.to_string(), segment: segment.clone() })?;
        if key.is_empty() {
            return Err(ParseError::EmptyKey { raw: raw.to_string(), segment });
        }
        params.insert(key, value);
    }

    Ok(StepSpec { name, params })
}

/// Parse `std::env::args` and validate into a [`ValidatedCli`].
pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = RawCli::parse();
    validate(cli)
}

fn validate(cli: RawCli) -> Result<ValidatedCli, ParseError> {
    if cli.small_delay_ms == 0 || cli.big_delay_ms == 0 {
        return Err(ParseError::InvalidDelay);
    }

    let steps = cli.steps.iter().map(|raw| parse_step_spec(raw)).collect::<Result<Vec<_>, _>>()?;

    Ok(ValidatedCli {
        project: cli.project,
        steps,
        small_delay_ms: cli.small_delay_ms,
        big_delay_ms: cli.big_delay_ms,
        claim_ttl_secs: cli.claim_ttl_secs,
        verbose: cli.verbose,
    })
}
