use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use uuid::Uuid;

/// Opaque conversation identifier handed out by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub Uuid);

impl ChatId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(text: &str) -> Option<Self> {
        Uuid::parse_str(text.trim()).ok().map(Self)
    }
}

impl Default for ChatId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Role in conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Conversation summary shown on list and search surfaces.
///
/// A transient mirror of backend data: fetched on list load or search,
/// discarded on the next re-render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: ChatId,
    pub title: Option<String>,
    pub last_message_at: DateTime<Utc>,
}

impl ChatSummary {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled chat")
    }
}

/// A single message in a conversation.
///
/// `content` may embed a delimited reasoning segment (`<think>…</think>`);
/// splitting that out is the renderer's job, not the data model's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, name: Option<String>, content: impl Into<String>) -> Self {
        Self {
            role,
            name,
            content: content.into(),
        }
    }
}

/// A full conversation as served by the backend when opening it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub title: Option<String>,
    pub messages: Vec<Message>,
}

/// Entry in the chat-type and model enumerations shown by the new-chat dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceItem {
    pub value: String,
    pub label: String,
}

impl ChoiceItem {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Events the backend pushes to the UI at will during an active generation.
///
/// Fragments for one generation arrive in order; nothing is guaranteed across
/// generations because only one may be active. A `Chunk` whose text is wrapped
/// in the reserved `<ERROR>` delimiter carries a generation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Chunk(String),
    Complete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_as_lowercase_strings() {
        // The wire shape the backend expects for message roles.
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
    }

    #[test]
    fn message_omits_absent_name() {
        let msg = Message::new(Role::System, None, "hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("name"));

        let named = Message::new(Role::User, Some("ada".into()), "hi");
        let json = serde_json::to_string(&named).unwrap();
        assert!(json.contains("\"name\":\"ada\""));
    }

    #[test]
    fn chat_id_round_trips_through_text() {
        let id = ChatId::new();
        let parsed = ChatId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(ChatId::parse("not-a-uuid").is_none());
    }

    #[test]
    fn untitled_summary_has_placeholder_title() {
        let summary = ChatSummary {
            id: ChatId::new(),
            title: None,
            last_message_at: Utc::now(),
        };
        assert_eq!(summary.display_title(), "Untitled chat");
    }
}
