use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Message, MessageRef};

/// A post or delete travelling in either direction over the realtime channel.
///
/// Wire shape: `{"action": "PostMessage", "message": {...}}` or
/// `{"action": "DeleteMessage", "message": {"id": "..."}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "message")]
pub enum ChatAction {
    PostMessage(Message),
    DeleteMessage(MessageRef),
}

impl ChatAction {
    pub fn delete(id: impl Into<String>) -> Self {
        ChatAction::DeleteMessage(MessageRef { id: id.into() })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChatAction::PostMessage(_) => "PostMessage",
            ChatAction::DeleteMessage(_) => "DeleteMessage",
        }
    }
}

/// Non-fatal error reported by the gateway: `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: String,
}

/// Everything the gateway can send to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// Past messages, oldest first. Sent once right after connecting.
    History(Vec<Message>),
    /// An incremental post or delete.
    Action(ChatAction),
    /// A rejected request or other gateway-side complaint.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unparseable message: {0}")]
    UnparseableMessage(String),
}

impl ServerFrame {
    /// Decode a text frame, dispatching on its shape: an array is history,
    /// an object with `action` is an action, an object with `error` is an error.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(unparseable)?;

        if value.is_array() {
            serde_json::from_value(value)
                .map(ServerFrame::History)
                .map_err(unparseable)
        } else if value.get("action").is_some() {
            serde_json::from_value(value)
                .map(ServerFrame::Action)
                .map_err(unparseable)
        } else if value.get("error").is_some() {
            serde_json::from_value::<ErrorFrame>(value)
                .map(|frame| ServerFrame::Error(frame.error))
                .map_err(unparseable)
        } else {
            Err(ProtocolError::UnparseableMessage(format!(
                "unknown frame shape: {}",
                text.chars().take(200).collect::<String>()
            )))
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            ServerFrame::History(messages) => serde_json::to_string(messages),
            ServerFrame::Action(action) => serde_json::to_string(action),
            ServerFrame::Error(error) => serde_json::to_string(&ErrorFrame {
                error: error.clone(),
            }),
        }
    }
}

fn unparseable(e: serde_json::Error) -> ProtocolError {
    ProtocolError::UnparseableMessage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn message(id: &str) -> Message {
        Message {
            id: id.to_string(),
            author_name: "alice".into(),
            author_uid: 7,
            author_role: Role::User,
            text: "hi".into(),
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn post_action_wire_shape() {
        let json = serde_json::to_value(ChatAction::PostMessage(message(""))).unwrap();
        assert_eq!(json["action"], "PostMessage");
        assert_eq!(json["message"]["author_name"], "alice");
        assert_eq!(json["message"]["id"], "");
    }

    #[test]
    fn delete_action_wire_shape() {
        let text = serde_json::to_string(&ChatAction::delete("abc")).unwrap();
        assert_eq!(text, r#"{"action":"DeleteMessage","message":{"id":"abc"}}"#);
    }

    #[test]
    fn delete_accepts_full_message_body() {
        let text = r#"{"action":"DeleteMessage","message":{"id":"x","author_name":"a","author_uid":1,"author_role":"mod","text":"t","timestamp":1}}"#;
        assert_eq!(ServerFrame::decode(text).unwrap(), ServerFrame::Action(ChatAction::delete("x")));
    }

    #[test]
    fn decodes_history() {
        let text = serde_json::to_string(&vec![message("1"), message("2")]).unwrap();
        match ServerFrame::decode(&text).unwrap() {
            ServerFrame::History(messages) => {
                assert_eq!(messages.len(), 2);
                assert_eq!(messages[1].id, "2");
            }
            other => panic!("expected history, got {:?}", other),
        }
        assert_eq!(ServerFrame::decode("[]").unwrap(), ServerFrame::History(vec![]));
    }

    #[test]
    fn decodes_error_frame() {
        let frame = ServerFrame::decode(r#"{"error": "No permission to delete this post"}"#).unwrap();
        assert_eq!(frame, ServerFrame::Error("No permission to delete this post".into()));
    }

    #[test]
    fn rejects_unknown_shapes() {
        assert!(ServerFrame::decode("not json").is_err());
        assert!(ServerFrame::decode(r#"{"hello": 1}"#).is_err());
        assert!(ServerFrame::decode("42").is_err());
        assert!(ServerFrame::decode(r#"{"action": "Explode", "message": {}}"#).is_err());
        assert!(ServerFrame::decode(r#"[{"id": 3}]"#).is_err());
    }

    #[test]
    fn encoded_frames_decode_back() {
        let frame = ServerFrame::Action(ChatAction::PostMessage(message("9")));
        assert_eq!(ServerFrame::decode(&frame.to_json().unwrap()).unwrap(), frame);
    }
}
