// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Persistence adapters implementing the `loom_domain::Store` port.

pub mod schema;
pub mod sqlite_store;

pub use sqlite_store::SqliteStore;
