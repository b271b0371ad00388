// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! An in-process `Store` used by dispatcher and end-to-end scenario tests
//! (§8) where spinning up SQLite would only add noise. Implements the
//! same atomic-claim contract as [`crate::infrastructure::repositories::SqliteStore`]
//! using a single mutex around a `HashMap`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use loom_domain::{PipelineError, RecordFilter, RecordId, RecordState, Store, StoreRecord};
use serde_json::Value;

struct Row {
    state: RecordState,
    claimed_at: Instant,
}

#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<HashMap<(String, String), Row>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn claim(&self, key: &str, id: &str) -> Result<bool, PipelineError> {
        let mut rows = self.rows.lock().map_err(|_| PipelineError::Internal("store mutex poisoned".into()))?;
        let k = (key.to_string(), id.to_string());
        if rows.contains_key(&k) {
            return Ok(false);
        }
        rows.insert(k, Row { state: RecordState::Claimed, claimed_at: Instant::now() });
        Ok(true)
    }

    async fn commit(&self, key: &str, id: &str, payload: Value, meta: Value) -> Result<(), PipelineError> {
        let mut rows = self.rows.lock().map_err(|_| PipelineError::Internal("store mutex poisoned".into()))?;
        let k = (key.to_string(), id.to_string());
        match rows.get_mut(&k) {
            Some(row) => {
                row.state = RecordState::Committed { payload, meta };
                Ok(())
            }
            None => Err(PipelineError::NotFound { key: key.to_string(), id: id.to_string() }),
        }
    }

    async fn abort(&self, key: &str, id: &str) -> Result<(), PipelineError> {
        let mut rows = self.rows.lock().map_err(|_| PipelineError::Internal("store mutex poisoned".into()))?;
        rows.remove(&(key.to_string(), id.to_string()));
        Ok(())
    }

    async fn load(&self, key: &str, id: &str) -> Result<Option<(Value, Value)>, PipelineError> {
        let rows = self.rows.lock().map_err(|_| PipelineError::Internal("store mutex poisoned".into()))?;
        match rows.get(&(key.to_string(), id.to_string())) {
            Some(Row { state: RecordState::Committed { payload, meta }, .. }) => {
                Ok(Some((payload.clone(), meta.clone())))
            }
            _ => Ok(None),
        }
    }

    async fn find(&self, filter: RecordFilter) -> Result<Vec<StoreRecord>, PipelineError> {
        let rows = self.rows.lock().map_err(|_| PipelineError::Internal("store mutex poisoned".into()))?;
        Ok(rows
            .iter()
            .filter(|((k, i), _)| {
                filter.key.as_deref().is_none_or(|fk| fk == k) && filter.id.as_deref().is_none_or(|fi| fi == i)
            })
            .map(|((k, i), row)| StoreRecord { key: k.clone(), id: RecordId::from(i.as_str()), state: row.state.clone() })
            .collect())
    }

    async fn all_keys(&self) -> Result<Vec<String>, PipelineError> {
        let rows = self.rows.lock().map_err(|_| PipelineError::Internal("store mutex poisoned".into()))?;
        let mut keys: Vec<String> = rows.keys().map(|(k, _)| k.clone()).collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn all_ids(&self, key: &str) -> Result<Vec<String>, PipelineError> {
        let rows = self.rows.lock().map_err(|_| PipelineError::Internal("store mutex poisoned".into()))?;
        let mut ids: Vec<String> = rows.keys().filter(|(k, _)| k == key).map(|(_, i)| i.clone()).collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn sweep_orphaned_claims(&self, key: &str, max_age_secs: i64) -> Result<u64, PipelineError> {
        let mut rows = self.rows.lock().map_err(|_| PipelineError::Internal("store mutex poisoned".into()))?;
        let max_age = std::time::Duration::from_secs(max_age_secs.max(0) as u64);
        let doomed: Vec<(String, String)> = rows
            .iter()
            .filter(|((k, _), row)| k == key && matches!(row.state, RecordState::Claimed) && row.claimed_at.elapsed() > max_age)
            .map(|(k, _)| k.clone())
            .collect();
        let count = doomed.len() as u64;
        for k in doomed {
            rows.remove(&k);
        }
        Ok(count)
    }
}
