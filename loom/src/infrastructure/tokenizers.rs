// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Chat-template tokenizers (§6 "Tokenizers").
//!
//! The two `internal:*` names render a single-turn conversation into a
//! plain-text prompt without pulling in a tokenizer library. Any other
//! name is out of core scope: the core only needs `apply_chat_template`,
//! so it is resolved through [`ExternalTokenizer`], a hook an embedder
//! wires up to whatever tokenization library they use.

use loom_domain::PipelineError;

/// One chat message, the unit `LLMCompletion`/`LLMExtraction` build
/// before handing off to a tokenizer or the LLM client directly.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

fn first_of(messages: &[ChatMessage], role: &str) -> Option<String> {
    messages.iter().find(|m| m.role == role).map(|m| m.content.clone())
}

/// `apply_chat_template`: render `messages` into one prompt string,
/// `system`/`user`/`assistant` extracted by role with the same
/// one-turn-only assumption the source tool makes.
pub trait Tokenizer: Send + Sync {
    fn apply_chat_template(&self, messages: &[ChatMessage]) -> String;
}

struct InternalTokenizer {
    render: fn(&str, &str, &str) -> String,
}

impl Tokenizer for InternalTokenizer {
    fn apply_chat_template(&self, messages: &[ChatMessage]) -> String {
        let system = first_of(messages, "system").unwrap_or_else(|| "You are a helpful assistant.".to_string());
        let user = first_of(messages, "user").unwrap_or_default();
        let assistant = first_of(messages, "assistant").unwrap_or_default();
        (self.render)(&system, &user, &assistant)
    }
}

fn render_vicuna(system: &str, user: &str, assistant: &str) -> String {
    format!("SYSTEM: {system}\n\nUSER: {user}\n\nASSISTANT:{assistant}")
}

fn render_alpaca(system: &str, user: &str, assistant: &str) -> String {
    format!("### Instruction:\n{system}\n\n### Input:\n{user}\n\n### Response:{assistant}")
}

/// Resolving an external (non-`internal:*`) tokenizer name is out of
/// core scope (§1); an embedder implements this against whatever
/// tokenization library they depend on.
pub trait ExternalTokenizer: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Box<dyn Tokenizer>, PipelineError>;
}

/// Resolve a tokenizer name. `external` is consulted only for names
/// other than `internal:vicuna` / `internal:alpaca`.
pub fn build_tokenizer(
    name: &str,
    external: Option<&dyn ExternalTokenizer>,
) -> Result<Box<dyn Tokenizer>, PipelineError> {
    match name {
        "internal:vicuna" => Ok(Box::new(InternalTokenizer { render: render_vicuna })),
        "internal:alpaca" => Ok(Box::new(InternalTokenizer { render: render_alpaca })),
        other => match external {
            Some(ext) => ext.resolve(other),
            None => Err(PipelineError::Internal(format!(
                "tokenizer `{other}` is not internal and no external tokenizer resolver was configured"
            ))),
        },
    }
}
