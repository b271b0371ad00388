// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! JSON extraction from free-form model text (§4.4 `LLMExtraction`, §9).
//!
//! The `{`…`}` substring heuristic is kept verbatim because it defines
//! observable behavior (it tolerates preamble/postamble the model adds
//! around the JSON object). The source tool's `simple_extract_json`
//! returns `first_key` — a bool — instead of the extracted data; that is
//! a bug, not a contract, so this returns the parsed value itself.

use serde_json::Value;

/// Locate the substring spanning the first `{` to the last `}`, parse it
/// as JSON, and return either the whole value or, if `first_key` is set,
/// the value under the object's first key. Returns `None` on any
/// failure — no braces found, invalid JSON, or `first_key` requested on
/// a non-object.
pub fn simple_extract_json(response: &str, first_key: bool) -> Option<Value> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }
    let candidate = &response[start..=end];
    let data: Value = serde_json::from_str(candidate).ok()?;

    if first_key {
        let obj = data.as_object()?;
        let key = obj.keys().next()?.clone();
        obj.get(&key).cloned()
    } else {
        Some(data)
    }
}
