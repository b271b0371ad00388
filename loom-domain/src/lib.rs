// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Domain layer: the `Record`/`Step`/`Store` ports and the pure pipeline
//! rules that do not depend on any particular storage or transport
//! technology. Infrastructure adapters (SQLite store, HTTP clients) live
//! in the `loom` crate and implement the traits declared here.

pub mod error;
pub mod params;
pub mod record;
pub mod step;
pub mod store;

pub use error::PipelineError;
pub use params::StepParams;
pub use record::{RecordId, RecordState, StoreRecord};
pub use step::{default_transform_pending, PendingInput, RunOutcome, Step};
pub use store::{RecordFilter, Store};
