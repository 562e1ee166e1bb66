//! Template-based legacy path.
//!
//! Answers with a fixed template around the message content. It never
//! touches the decision graph, so it is always safe to fall back to.

use routegraph_core::collab::legacy::LegacyPath;
use routegraph_types::result::{LegacyError, LegacyResult};
use serde_json::{Map, Value};

const EMPTY_REPLY: &str = "I'm here whenever you need me.";

#[derive(Debug, Clone, Default)]
pub struct TemplateLegacyPath;

impl TemplateLegacyPath {
    pub fn new() -> Self {
        Self
    }
}

/// Message text of a raw input: the string itself or its `content` field.
fn message_text(input: &Value) -> &str {
    match input {
        Value::String(text) => text.as_str(),
        Value::Object(map) => map.get("content").and_then(Value::as_str).unwrap_or(""),
        _ => "",
    }
}

impl LegacyPath for TemplateLegacyPath {
    async fn process(
        &self,
        correlation_id: &str,
        input: &Value,
        _context: &Map<String, Value>,
    ) -> Result<LegacyResult, LegacyError> {
        let text = message_text(input).trim();
        let response = if text.is_empty() {
            EMPTY_REPLY.to_string()
        } else {
            format!("Thanks for your message: \"{text}\"")
        };
        tracing::debug!(correlation_id, "legacy path produced a response");
        Ok(LegacyResult::new(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn echoes_string_and_object_content() {
        let legacy = TemplateLegacyPath::new();
        let a = legacy.process("r", &json!("hi"), &Map::new()).await.unwrap();
        let b = legacy
            .process("r", &json!({ "content": "hi" }), &Map::new())
            .await
            .unwrap();
        assert_eq!(a.response, b.response);
        assert!(a.legacy);
        assert_eq!(a.response, "Thanks for your message: \"hi\"");
    }

    #[tokio::test]
    async fn empty_input_gets_default_reply() {
        let result = TemplateLegacyPath::new()
            .process("r", &json!(null), &Map::new())
            .await
            .unwrap();
        assert_eq!(result.response, EMPTY_REPLY);
    }
}
