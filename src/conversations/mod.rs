//! Conversations: records, the store, the composer and chat dispatch.

pub mod chat;
pub mod composer;
pub mod store;
pub mod types;

pub use chat::{ChatController, ChatError, ERROR_REPLY_PREFIX, Route, SendOutcome};
pub use composer::{Composer, ComposerError, Outgoing, PNG_DATA_URL_PREFIX, PendingImage};
pub use store::{ConversationStore, SharedConversationStore};
pub use types::{Attachment, Conversation, DEFAULT_TITLE, EMPTY_PREVIEW, Message, Sender};
