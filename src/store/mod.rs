// src/store/mod.rs
pub mod models;
pub mod message_store;
pub mod conversation_store;

pub use conversation_store::{ConversationStore, DeleteOutcome, SqliteConversationStore};
pub use message_store::{MessageStore, NewMessage, SqliteMessageStore};
pub use models::{Conversation, Message, Role};
