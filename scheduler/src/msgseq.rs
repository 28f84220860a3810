//! Message-sequence construction for LLM agent calls.
//!
//! Grounded on `original_source`'s `msgseq` module, which lets a
//! program build a chat history by composing small operator-overload
//! combinators (`seq1 + seq2`, slicing a conversation) rather than
//! hand-assembling a list of dicts. Prompt templating itself is out of
//! scope (section 1) - a [`MsgSeq`] is treated as an opaque callable
//! producing a message list, per the specification's "Model client
//! contract" note - but the combinator shape that builds one is a
//! dropped feature worth carrying forward since agent programs
//! otherwise have no ergonomic way to assemble multi-turn prompts.

use std::sync::Arc;

use crate::error::SchedulerError;
use crate::graph::ResolvedInputs;

/// One message in a chat-style request to the remote model.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    /// `"system"`, `"user"`, `"assistant"`, or `"tool"`.
    pub role: String,
    /// The message body.
    pub content: String,
}

impl ChatMessage {
    /// Convenience constructor.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage { role: role.into(), content: content.into() }
    }
}

/// Builds the outgoing message list for an LLM agent call from its
/// resolved inputs.
///
/// Implementors close over whatever additional context they need
/// (templates, prior conversation); the scheduler only ever calls
/// `build`.
pub trait MsgSeq: Send + Sync {
    /// Produces the message list to send to the model.
    fn build(&self, inputs: &ResolvedInputs) -> Result<Vec<ChatMessage>, SchedulerError>;
}

/// A fixed, precomputed message sequence - the degenerate case where
/// no templating is needed.
pub struct Literal(pub Vec<ChatMessage>);

impl MsgSeq for Literal {
    fn build(&self, _inputs: &ResolvedInputs) -> Result<Vec<ChatMessage>, SchedulerError> {
        Ok(self.0.clone())
    }
}

/// Concatenates two message sequences, mirroring `original_source`'s
/// `MsgSeq.__add__` combinator.
pub struct Concat(pub Arc<dyn MsgSeq>, pub Arc<dyn MsgSeq>);

impl MsgSeq for Concat {
    fn build(&self, inputs: &ResolvedInputs) -> Result<Vec<ChatMessage>, SchedulerError> {
        let mut messages = self.0.build(inputs)?;
        messages.extend(self.1.build(inputs)?);
        Ok(messages)
    }
}

/// Builds a single user-role message by formatting a template against
/// a positional input, the common case for a one-shot prompt.
pub struct Template {
    /// Role to tag the resulting message with.
    pub role: String,
    /// Called with the task's resolved inputs to produce message text.
    pub format: Arc<dyn Fn(&ResolvedInputs) -> String + Send + Sync>,
}

impl MsgSeq for Template {
    fn build(&self, inputs: &ResolvedInputs) -> Result<Vec<ChatMessage>, SchedulerError> {
        Ok(vec![ChatMessage::new(self.role.clone(), (self.format)(inputs))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_preserves_order() {
        let a = Arc::new(Literal(vec![ChatMessage::new("system", "be terse")]));
        let b = Arc::new(Literal(vec![ChatMessage::new("user", "hello")]));
        let combined = Concat(a, b);
        let inputs: ResolvedInputs = Default::default();
        let built = combined.build(&inputs).unwrap();
        assert_eq!(built.len(), 2);
        assert_eq!(built[0].role, "system");
        assert_eq!(built[1].role, "user");
    }
}
