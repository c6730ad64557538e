use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Encoding of chunk payloads on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobEncoding {
    #[default]
    Base64,
}

/// Caller metadata attached to a transfer at `blob_start` and echoed back on
/// completion. Only `conversationId` is interpreted; every other key is
/// carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BlobContext {
    pub fn for_conversation(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: Some(conversation_id.into()),
            extra: Map::new(),
        }
    }

    /// The conversation this blob belongs to, if it names a non-empty one.
    pub fn conversation(&self) -> Option<&str> {
        self.conversation_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Which blob operation a `blob_result` answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobOp {
    Start,
    Chunk,
    End,
    Request,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_unknown_keys() {
        let raw = r#"{"conversationId":"c1","messageId":"m9"}"#;
        let ctx: BlobContext = serde_json::from_str(raw).unwrap();
        assert_eq!(ctx.conversation(), Some("c1"));
        assert_eq!(ctx.extra.get("messageId"), Some(&Value::from("m9")));

        let back = serde_json::to_value(&ctx).unwrap();
        assert_eq!(back["messageId"], "m9");
    }

    #[test]
    fn test_empty_conversation_is_none() {
        let ctx = BlobContext::for_conversation("");
        assert_eq!(ctx.conversation(), None);
        assert_eq!(BlobContext::default().conversation(), None);
    }
}
