//! Conversation data structures

use serde::{Deserialize, Serialize};

use super::params::ParameterSet;

/// Persona used when none was chosen or recorded
pub const DEFAULT_PERSONA: &str = "default";

/// Model reported for records written before parameters were stored
pub const LEGACY_MODEL: &str = "gpt-3.5-turbo";

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// The persisted unit: one conversation with its settings and audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Persona name (or inline persona text) the conversation started with
    #[serde(rename = "system")]
    pub persona_name: String,
    /// Parameters the conversation was started with
    #[serde(rename = "params")]
    pub parameters: ParameterSet,
    /// Turn-ordered messages, replayed to the API verbatim
    pub messages: Vec<Message>,
    /// Raw API responses, append-only and never replayed
    #[serde(rename = "resp")]
    pub raw_responses: Vec<serde_json::Value>,
}

impl ConversationRecord {
    /// Create an empty record for a new conversation
    pub fn new(persona_name: impl Into<String>, parameters: ParameterSet) -> Self {
        Self {
            persona_name: persona_name.into(),
            parameters,
            messages: Vec::new(),
            raw_responses: Vec::new(),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Model identifier the conversation runs on
    pub fn model(&self) -> &str {
        self.parameters.model().unwrap_or(LEGACY_MODEL)
    }

    /// Leading system message, if the conversation has one
    pub fn system_message(&self) -> Option<&Message> {
        self.messages.first().filter(|m| m.role == Role::System)
    }

    pub fn first_of(&self, role: Role) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == role)
    }

    /// Check the system / user / assistant ordering.
    ///
    /// Returns true when at most one system message leads and user and
    /// assistant turns alternate starting with user. A trailing user message
    /// (a turn awaiting its answer) is accepted.
    pub fn is_well_formed(&self) -> bool {
        let turns = match self.messages.first() {
            Some(m) if m.role == Role::System => &self.messages[1..],
            _ => &self.messages[..],
        };
        turns.iter().enumerate().all(|(i, m)| {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            m.role == expected
        })
    }

    /// True when the last completed turn ended with an assistant reply
    pub fn is_turn_complete(&self) -> bool {
        self.is_well_formed()
            && self
                .messages
                .last()
                .map(|m| m.role == Role::Assistant)
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_serializes_with_disk_field_names() {
        let mut record = ConversationRecord::new("default", ParameterSet::new().with("model", "gpt-4o"));
        record.push(Message::user("Hei"));
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["system"], json!("default"));
        assert_eq!(value["params"]["model"], json!("gpt-4o"));
        assert_eq!(value["messages"][0], json!({"role": "user", "content": "Hei"}));
        assert_eq!(value["resp"], json!([]));
    }

    #[test]
    fn test_well_formed_ordering() {
        let mut record = ConversationRecord::new("default", ParameterSet::new());
        record.push(Message::system("Be brief"));
        record.push(Message::user("q1"));
        assert!(record.is_well_formed());
        assert!(!record.is_turn_complete());

        record.push(Message::assistant("a1"));
        assert!(record.is_turn_complete());

        record.push(Message::assistant("a2"));
        assert!(!record.is_well_formed());
    }

    #[test]
    fn test_second_system_message_is_rejected() {
        let mut record = ConversationRecord::new("default", ParameterSet::new());
        record.push(Message::system("one"));
        record.push(Message::system("two"));
        assert!(!record.is_well_formed());
    }

    #[test]
    fn test_model_falls_back_to_legacy_default() {
        let record = ConversationRecord::new("default", ParameterSet::new());
        assert_eq!(record.model(), LEGACY_MODEL);
    }
}
