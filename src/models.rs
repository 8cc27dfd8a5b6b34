use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default title for a thread that has not been named yet, either by the
/// user or by the auto-title workflow.
pub const DEFAULT_TITLE: &str = "New Chat";

// Who authored a message. Stored as lowercase text in the database and on
// the wire; `system` only ever appears in outbound API payloads.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
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

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(anyhow::anyhow!("Unknown message role: {}", other)),
        }
    }
}

// Represents a single message in a conversation thread
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    #[serde(default = "Uuid::new_v4")] // Generate a new UUID if missing during deserialization
    pub id: Uuid,
    pub thread_id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

// Represents the metadata for a conversation thread
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Thread {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub owner_id: String,
    pub title: String, // e.g. "Chat about Rust" (potentially auto-generated)
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_updated_at: DateTime<Utc>,
}

impl Thread {
    /// True while the thread still carries the unnamed-sentinel title.
    pub fn is_unnamed(&self) -> bool {
        self.title == DEFAULT_TITLE
    }
}

/// One entry in the thread-title cache. Timestamps are epoch milliseconds.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TitleRecord {
    pub thread_id: Uuid,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// The single, process-wide user-supplied routing key. `model_id` optionally
/// overrides the default chat model while the key is in effect.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CustomApiKeyRecord {
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    pub saved_at: i64,
}

/// A zero-cost catalog entry as exposed by the models endpoint.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FreeModel {
    pub id: String,
    pub name: String,
    pub context_length: i64,
    pub description: String,
}
