// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! SQLite-backed `Store` (§4.1).
//!
//! `claim`'s atomicity rests entirely on the `(key, id)` primary key: a
//! plain `INSERT` that loses the race surfaces as a unique-constraint
//! violation, which is the only outcome this adapter treats as "someone
//! else already has this slot" rather than a genuine error (§9 "Atomic
//! claim").

use async_trait::async_trait;
use loom_domain::{PipelineError, RecordFilter, RecordId, RecordState, Store, StoreRecord};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use super::schema;

/// The JSON-text sentinel for the claimed state (§6).
const CLAIM_SENTINEL: &str = "null";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if necessary) the project file at `database_url`
    /// (a `sqlite://` URL) and apply pending migrations.
    pub async fn open(database_url: &str) -> Result<Self, PipelineError> {
        let pool = schema::initialize_database(database_url)
            .await
            .map_err(|e| PipelineError::Store(e.to_string()))?;
        Ok(Self { pool })
    }

    fn row_to_record(key: String, id: String, payload: String, meta: String) -> StoreRecord {
        let state = if payload == CLAIM_SENTINEL && meta == CLAIM_SENTINEL {
            RecordState::Claimed
        } else {
            let payload: Value = serde_json::from_str(&payload).unwrap_or(Value::Null);
            let meta: Value = serde_json::from_str(&meta).unwrap_or(Value::Null);
            RecordState::Committed { payload, meta }
        };
        StoreRecord { key, id: RecordId::from(id), state }
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn claim(&self, key: &str, id: &str) -> Result<bool, PipelineError> {
        let result = sqlx::query(
            "INSERT INTO records (key, id, payload, meta) VALUES (?1, ?2, 'null', 'null')",
        )
        .bind(key)
        .bind(id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(false),
            Err(e) => Err(PipelineError::Store(e.to_string())),
        }
    }

    async fn commit(&self, key: &str, id: &str, payload: Value, meta: Value) -> Result<(), PipelineError> {
        let payload_text = serde_json::to_string(&payload).map_err(|e| PipelineError::Store(e.to_string()))?;
        let meta_text = serde_json::to_string(&meta).map_err(|e| PipelineError::Store(e.to_string()))?;

        sqlx::query("UPDATE records SET payload = ?1, meta = ?2 WHERE key = ?3 AND id = ?4")
            .bind(payload_text)
            .bind(meta_text)
            .bind(key)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::Store(e.to_string()))?;
        Ok(())
    }

    async fn abort(&self, key: &str, id: &str) -> Result<(), PipelineError> {
        sqlx::query("DELETE FROM records WHERE key = ?1 AND id = ?2")
            .bind(key)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::Store(e.to_string()))?;
        Ok(())
    }

    async fn load(&self, key: &str, id: &str) -> Result<Option<(Value, Value)>, PipelineError> {
        let row = sqlx::query("SELECT payload, meta FROM records WHERE key = ?1 AND id = ?2")
            .bind(key)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::Store(e.to_string()))?;

        let Some(row) = row else { return Ok(None) };
        let payload: String = row.try_get("payload").map_err(|e| PipelineError::Store(e.to_string()))?;
        let meta: String = row.try_get("meta").map_err(|e| PipelineError::Store(e.to_string()))?;

        if payload == CLAIM_SENTINEL && meta == CLAIM_SENTINEL {
            return Ok(None);
        }

        let payload = serde_json::from_str(&payload).map_err(|e| PipelineError::Store(e.to_string()))?;
        let meta = serde_json::from_str(&meta).map_err(|e| PipelineError::Store(e.to_string()))?;
        Ok(Some((payload, meta)))
    }

    async fn find(&self, filter: RecordFilter) -> Result<Vec<StoreRecord>, PipelineError> {
        let rows = match (&filter.key, &filter.id) {
            (Some(key), Some(id)) => {
                sqlx::query("SELECT key, id, payload, meta FROM records WHERE key = ?1 AND id = ?2")
                    .bind(key)
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await
            }
            (Some(key), None) => {
                sqlx::query("SELECT key, id, payload, meta FROM records WHERE key = ?1")
                    .bind(key)
                    .fetch_all(&self.pool)
                    .await
            }
            (None, Some(id)) => {
                sqlx::query("SELECT key, id, payload, meta FROM records WHERE id = ?1")
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await
            }
            (None, None) => sqlx::query("SELECT key, id, payload, meta FROM records").fetch_all(&self.pool).await,
        }
        .map_err(|e| PipelineError::Store(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let key: String = row.try_get("key").map_err(|e| PipelineError::Store(e.to_string()))?;
                let id: String = row.try_get("id").map_err(|e| PipelineError::Store(e.to_string()))?;
                let payload: String = row.try_get("payload").map_err(|e| PipelineError::Store(e.to_string()))?;
                let meta: String = row.try_get("meta").map_err(|e| PipelineError::Store(e.to_string()))?;
                Ok(Self::row_to_record(key, id, payload, meta))
            })
            .collect()
    }

    async fn all_keys(&self) -> Result<Vec<String>, PipelineError> {
        let rows = sqlx::query("SELECT DISTINCT key FROM records")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::Store(e.to_string()))?;
        rows.into_iter()
            .map(|row| row.try_get("key").map_err(|e| PipelineError::Store(e.to_string())))
            .collect()
    }

    async fn all_ids(&self, key: &str) -> Result<Vec<String>, PipelineError> {
        let rows = sqlx::query("SELECT DISTINCT id FROM records WHERE key = ?1")
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::Store(e.to_string()))?;
        rows.into_iter()
            .map(|row| row.try_get("id").map_err(|e| PipelineError::Store(e.to_string())))
            .collect()
    }

    async fn sweep_orphaned_claims(&self, key: &str, max_age_secs: i64) -> Result<u64, PipelineError> {
        let result = sqlx::query(
            "DELETE FROM records \
             WHERE key = ?1 AND payload = 'null' AND meta = 'null' \
             AND claimed_at <= datetime('now', '-' || ?2 || ' seconds')",
        )
        .bind(key)
        .bind(max_age_secs)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Store(e.to_string()))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    async fn open_temp() -> (SqliteStore, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let url = format!("sqlite://{}", temp.path().to_str().unwrap());
        let store = SqliteStore::open(&url).await.unwrap();
        (store, temp)
    }

    #[tokio::test]
    async fn claim_then_claim_again_fails() {
        let (store, _temp) = open_temp().await;
        assert!(store.claim("a", "1").await.unwrap());
        assert!(!store.claim("a", "1").await.unwrap());
    }

    #[tokio::test]
    async fn commit_then_load_round_trips() {
        let (store, _temp) = open_temp().await;
        store.claim("a", "1").await.unwrap();
        store
            .commit("a", "1", serde_json::json!({"x": 1}), serde_json::json!({"model": "m"}))
            .await
            .unwrap();
        let (payload, meta) = store.load("a", "1").await.unwrap().unwrap();
        assert_eq!(payload, serde_json::json!({"x": 1}));
        assert_eq!(meta, serde_json::json!({"model": "m"}));
    }

    #[tokio::test]
    async fn load_returns_none_while_claimed() {
        let (store, _temp) = open_temp().await;
        store.claim("a", "1").await.unwrap();
        assert!(store.load("a", "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn abort_erases_row() {
        let (store, _temp) = open_temp().await;
        store.claim("a", "1").await.unwrap();
        store.abort("a", "1").await.unwrap();
        assert!(store.find(RecordFilter::by_key_and_id("a", "1")).await.unwrap().is_empty());
        // the id is claimable again after abort
        assert!(store.claim("a", "1").await.unwrap());
    }

    #[tokio::test]
    async fn find_filters_by_key() {
        let (store, _temp) = open_temp().await;
        store.claim("a", "1").await.unwrap();
        store.claim("b", "1").await.unwrap();
        let rows = store.find(RecordFilter::by_key("a")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "a");
    }

    #[tokio::test]
    async fn sweep_removes_only_old_claims() {
        let (store, _temp) = open_temp().await;
        store.claim("a", "1").await.unwrap();
        // A claim made "now" is not older than any positive age.
        let removed = store.sweep_orphaned_claims("a", 3600).await.unwrap();
        assert_eq!(removed, 0);
        let removed = store.sweep_orphaned_claims("a", -1).await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn concurrent_claims_have_exactly_one_winner() {
        // P1: fixed-width (16 contenders) smoke test for the unique-claim
        // invariant; see `exactly_one_winner_for_any_contender_count` below
        // for the same property over a range of contender counts.
        let (store, _temp) = open_temp().await;
        let store = std::sync::Arc::new(store);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.claim("race", "x").await.unwrap() }));
        }
        let mut wins = 0;
        for h in handles {
            if h.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    proptest::proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(8))]
        // P1: whatever the contender count, exactly one `claim` wins.
        #[test]
        fn exactly_one_winner_for_any_contender_count(n in 2usize..20) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let wins = rt.block_on(async {
                let (store, _temp) = open_temp().await;
                let store = std::sync::Arc::new(store);
                let mut handles = Vec::new();
                for _ in 0..n {
                    let store = store.clone();
                    handles.push(tokio::spawn(async move { store.claim("race", "x").await.unwrap() }));
                }
                let mut wins = 0;
                for h in handles {
                    if h.await.unwrap() {
                        wins += 1;
                    }
                }
                wins
            });
            proptest::prop_assert_eq!(wins, 1);
        }
    }
}
