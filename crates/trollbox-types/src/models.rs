use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Forum role carried by a token and stamped on every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Mod,
    Admin,
}

impl Role {
    /// Moderators and admins may delete any message.
    pub fn can_moderate(self) -> bool {
        matches!(self, Role::Mod | Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Mod => "mod",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "mod" => Ok(Role::Mod),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

/// Identity vouched for by the forum.
///
/// Field order is part of the signing contract: the token signature is
/// computed over the JSON serialization of this struct, so `timestamp`,
/// `username`, `uid`, `role` must stay in this order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Issue time, unix seconds.
    pub timestamp: u64,
    pub username: String,
    pub uid: u32,
    pub role: Role,
}

/// A chat message as it travels over the realtime channel.
///
/// `id` is empty on client drafts; the gateway assigns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: String,
    pub author_name: String,
    pub author_uid: u32,
    pub author_role: Role,
    pub text: String,
    pub timestamp: u64,
}

impl Message {
    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Just enough of a message to address it; used by delete actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Mod).unwrap(), "\"mod\"");
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
        assert!(serde_json::from_str::<Role>("\"owner\"").is_err());
    }

    #[test]
    fn only_mods_and_admins_moderate() {
        assert!(!Role::User.can_moderate());
        assert!(Role::Mod.can_moderate());
        assert!(Role::Admin.can_moderate());
        assert_eq!("mod".parse::<Role>().unwrap(), Role::Mod);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn credentials_keep_signing_field_order() {
        let creds = Credentials {
            timestamp: 1_600_000_000,
            username: "alice".into(),
            uid: 7,
            role: Role::User,
        };
        assert_eq!(
            serde_json::to_string(&creds).unwrap(),
            r#"{"timestamp":1600000000,"username":"alice","uid":7,"role":"user"}"#
        );
    }

    #[test]
    fn message_id_defaults_to_empty() {
        let msg: Message = serde_json::from_str(
            r#"{"author_name":"bob","author_uid":2,"author_role":"user","text":"hi","timestamp":5}"#,
        )
        .unwrap();
        assert!(!msg.has_id());
        assert_eq!(msg.text, "hi");
    }
}
