use trollbox_types::{ChatAction, Credentials, Message};

/// Build a post draft stamped with the current time and the caller's
/// identity. The gateway assigns the id.
pub fn encode_post(text: impl Into<String>, credentials: &Credentials) -> ChatAction {
    let timestamp = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
    ChatAction::PostMessage(Message {
        id: String::new(),
        author_name: credentials.username.clone(),
        author_uid: credentials.uid,
        author_role: credentials.role,
        text: text.into(),
        timestamp,
    })
}

pub fn encode_delete(message_id: impl Into<String>) -> ChatAction {
    ChatAction::delete(message_id)
}
