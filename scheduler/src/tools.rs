//! Tool definitions exposed to LLM agents.
//!
//! Grounded on `original_source`'s `toollist`/`tools` modules, which
//! reflect a Python callable's signature into a JSON-schema tool
//! description for the model. Reflection has no equivalent in Rust, so
//! a [`Tool`] instead declares its schema explicitly and wraps an
//! ordinary closure; the scheduler's job is only to route a model's
//! tool call back into that closure and, if the tool mutates a shared
//! object, to make sure that object is in the calling task's `refs`
//! (exercised by scenario S4).

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::error::SchedulerError;

/// A single tool an LLM agent may call.
pub struct Tool {
    /// Name the model uses to invoke this tool.
    pub name: String,
    /// Human-readable description surfaced to the model.
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters_schema: JsonValue,
    /// Invokes the tool with the model-supplied arguments.
    pub call: Arc<dyn Fn(JsonValue) -> Result<JsonValue, SchedulerError> + Send + Sync>,
}

impl Tool {
    /// Builds a tool description.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: JsonValue,
        call: impl Fn(JsonValue) -> Result<JsonValue, SchedulerError> + Send + Sync + 'static,
    ) -> Self {
        Tool {
            name: name.into(),
            description: description.into(),
            parameters_schema,
            call: Arc::new(call),
        }
    }
}

/// An ordered collection of tools offered to the model for a single
/// LLM agent call.
#[derive(Default)]
pub struct ToolList {
    tools: Vec<Tool>,
}

impl ToolList {
    /// Builds an empty tool list.
    pub fn new() -> Self {
        ToolList { tools: Vec::new() }
    }

    /// Adds a tool, builder-style.
    pub fn with(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    /// Looks up a tool by name.
    pub fn find(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// All tools, in declaration order - what gets serialized into the
    /// request sent to the model.
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Dispatches a model-issued tool call by name.
    pub fn invoke(&self, name: &str, args: JsonValue) -> Result<JsonValue, SchedulerError> {
        match self.find(name) {
            Some(tool) => (tool.call)(args),
            None => Err(SchedulerError::ModelClient(format!("unknown tool: {name}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invoke_routes_to_the_named_tool() {
        let list = ToolList::new().with(Tool::new(
            "double",
            "doubles a number",
            json!({"type": "object"}),
            |args| Ok(json!(args["n"].as_i64().unwrap_or(0) * 2)),
        ));
        let result = list.invoke("double", json!({"n": 21})).unwrap();
        assert_eq!(result, json!(42));
    }

    #[test]
    fn invoke_rejects_unknown_tool() {
        let list = ToolList::new();
        assert!(list.invoke("nope", json!({})).is_err());
    }
}
