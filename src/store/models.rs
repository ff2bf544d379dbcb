// src/store/models.rs
//! The two DAG entities: `Conversation` (relational metadata) and `Message`
//! (document DAG node).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const MAX_TITLE_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// A DAG node. `parent_ids`/`children` are sets: order within them is not
/// observable, only membership and cardinality matter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub reasoning: Option<String>,
    pub model: Option<String>,
    pub parent_ids: BTreeSet<String>,
    pub children: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_user(&self) -> bool {
        self.role == Role::User.as_str()
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant.as_str()
    }

    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub models: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_title(&self) -> bool {
        !self.title.is_empty()
    }
}
