// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `model_max` back-pressure (§4.2): steps that call out to a named model
//! cap how many committed records at their `outkey` carry that model in
//! `meta.model`, so a pipeline author can bound spend on an expensive
//! model while cheaper ones keep running unthrottled.

use loom_domain::{PipelineError, RecordFilter, RecordState, Store};

/// Count committed rows at `outkey` whose `meta.model` equals `model`.
pub async fn count_committed_for_model(store: &dyn Store, outkey: &str, model: &str) -> Result<usize, PipelineError> {
    let rows = store.find(RecordFilter::by_key(outkey)).await?;
    Ok(rows
        .into_iter()
        .filter(|r| match &r.state {
            RecordState::Committed { meta, .. } => meta.get("model").and_then(|v| v.as_str()) == Some(model),
            RecordState::Claimed => false,
        })
        .count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::InMemoryStore;

    #[tokio::test]
    async fn counts_only_matching_model() {
        let store = InMemoryStore::new();
        store.claim("out", "1").await.unwrap();
        store.commit("out", "1", serde_json::json!("a"), serde_json::json!({"model": "big"})).await.unwrap();
        store.claim("out", "2").await.unwrap();
        store.commit("out", "2", serde_json::json!("b"), serde_json::json!({"model": "small"})).await.unwrap();
        store.claim("out", "3").await.unwrap();

        assert_eq!(count_committed_for_model(&store, "out", "big").await.unwrap(), 1);
        assert_eq!(count_committed_for_model(&store, "out", "small").await.unwrap(), 1);
        assert_eq!(count_committed_for_model(&store, "out", "other").await.unwrap(), 0);
    }
}
