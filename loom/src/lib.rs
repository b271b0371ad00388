// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! A durable, resumable, content-addressed pipeline engine for dataset
//! construction.
//!
//! A pipeline is a directed graph of named [`loom_domain::Step`]s reading
//! and writing a shared [`loom_domain::Store`] keyed by `(key, id)`. The
//! Dispatcher drives every registered step to quiescence: on each pass it
//! asks each step for pending work, claims a slot in the Store, runs the
//! step, and commits or aborts the result. Crashing and re-running the
//! same `--step` set resumes from whatever was already committed — the
//! Store, not in-memory state, is the only record of progress.
//!
//! - [`infrastructure`]: the Store implementations (SQLite, in-memory),
//!   HTTP clients for the model/image backends, tokenizers, configuration
//!   and logging bootstrap.
//! - [`application`]: the built-in step kinds, the step registry, and the
//!   Dispatcher.

pub mod application;
pub mod infrastructure;

pub use loom_domain::{PipelineError, RecordFilter, RecordId, Step, StepParams, Store};
