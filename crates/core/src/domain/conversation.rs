use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One transcript entry. Immutable once appended to a session history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Persisted state of one intake session. The conversation id is assigned
/// exactly once at first load; `history` is append-only; once `completed`
/// flips to true the record is replayed read-only and `loan_id` never
/// changes again.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub conversation_id: String,
    pub history: Vec<Message>,
    pub collected: Map<String, Value>,
    pub completed: bool,
    pub loan_id: Option<i64>,
}

impl ConversationRecord {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            history: Vec::new(),
            collected: Map::new(),
            completed: false,
            loan_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Message, Role};

    #[test]
    fn roles_serialize_lowercase() {
        let encoded =
            serde_json::to_string(&Message::user("hi")).expect("message should serialize");
        assert_eq!(encoded, r#"{"role":"user","content":"hi"}"#);
    }

    #[test]
    fn roles_deserialize_from_wire_form() {
        let message: Message = serde_json::from_str(r#"{"role":"assistant","content":"ok"}"#)
            .expect("message should deserialize");
        assert_eq!(message.role, Role::Assistant);
    }
}
