// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The application layer: built-in step kinds, the step registry, the
//! JSON extraction helper they share, and the Dispatcher that drives a
//! configured pipeline to quiescence.

pub mod dispatcher;
pub mod json_extract;
pub mod model_quota;
pub mod registry;
pub mod steps;
