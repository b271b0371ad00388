// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The `Record` entity and its lifecycle states.
//!
//! A record is the sole persistent entity in the engine (§3 of the design
//! spec). `(key, id)` is its primary key; `payload`/`meta` are both `null`
//! while a claim is outstanding and both non-null once committed — no
//! partial state is ever externally visible (invariant I2).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Opaque identifier of one artifact within a key space.
///
/// Generator steps mint fresh ids via [`RecordId::fresh`] (invariant I4,
/// a UUID v4); transform steps inherit the id of their causal input, so a
/// `RecordId` is just a validated non-empty string, not necessarily a UUID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    /// Mint a globally fresh id (UUID v4), as required of generator steps.
    pub fn fresh() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The three lifecycle states a `(key, id)` row can be in.
///
/// `Absent` has no row at all and is therefore not representable as a
/// value of this enum; callers observe it as `Option::None` from
/// [`crate::store::Store::load`] or as a missing row from
/// [`crate::store::Store::find`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordState {
    /// A worker has committed to producing this record; no other worker
    /// may take the slot. `payload` and `meta` are both absent.
    Claimed,
    /// Terminal state under normal operation.
    Committed { payload: Value, meta: Value },
}

/// A full row as returned by [`crate::store::Store::find`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRecord {
    pub key: String,
    pub id: RecordId,
    pub state: RecordState,
}

impl StoreRecord {
    /// `true` for a row whose slot is reserved but not yet committed.
    pub fn is_claimed(&self) -> bool {
        matches!(self.state, RecordState::Claimed)
    }

    pub fn payload(&self) -> Option<&Value> {
        match &self.state {
            RecordState::Committed { payload, .. } => Some(payload),
            RecordState::Claimed => None,
        }
    }
}
