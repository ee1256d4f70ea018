//! Types for conversation management.

use std::fmt;
use std::str::FromStr;

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::core::ids::{ConversationId, MessageId};

/// Title shown for a conversation that was never renamed.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Preview shown for a conversation without messages.
pub const EMPTY_PREVIEW: &str = "Start a conversation...";

/// Metadata for a conversation displayed in the sidebar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier.
    pub id: ConversationId,
    /// Display title; empty until renamed.
    pub title: String,
    /// Content of the most recent message.
    pub last_message_preview: String,
    /// Optional icon reference.
    pub icon: Option<String>,
}

impl Conversation {
    /// Create an untitled conversation with a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self::titled(String::new(), None)
    }

    /// Create a conversation with a title and icon.
    #[must_use]
    pub fn titled(title: impl Into<String>, icon: Option<String>) -> Self {
        Self {
            id: ConversationId::new(),
            title: title.into(),
            last_message_preview: String::new(),
            icon,
        }
    }

    /// Title for display, falling back to [`DEFAULT_TITLE`].
    #[must_use]
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            DEFAULT_TITLE
        } else {
            &self.title
        }
    }

    /// Preview for display, falling back to [`EMPTY_PREVIEW`].
    #[must_use]
    pub fn display_preview(&self) -> &str {
        if self.last_message_preview.is_empty() {
            EMPTY_PREVIEW
        } else {
            &self.last_message_preview
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Author of a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// Local user.
    User,
    /// Generation service.
    Assistant,
}

impl Sender {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(value.to_string()),
        }
    }
}

/// Media carried by a message.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "source", rename_all = "snake_case")]
pub enum Attachment {
    /// Image reference (path or data URL), stored verbatim.
    Image(String),
    /// Raw audio command output; see [`crate::render::extract_audio_source`].
    Audio(String),
}

/// One immutable turn in a conversation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// Author.
    pub sender: Sender,
    /// Text payload.
    pub content: String,
    /// `HH:MM` local creation time.
    pub timestamp: String,
    /// Optional media.
    pub attachment: Option<Attachment>,
}

impl Message {
    fn build(sender: Sender, content: String, attachment: Option<Attachment>) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            content,
            timestamp: Local::now().format("%H:%M").to_string(),
            attachment,
        }
    }

    /// Build a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::build(Sender::User, content.into(), None)
    }

    /// Build an assistant text message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::build(Sender::Assistant, content.into(), None)
    }

    /// Build an assistant message carrying an attachment and no text.
    #[must_use]
    pub fn assistant_attachment(attachment: Attachment) -> Self {
        Self::build(Sender::Assistant, String::new(), Some(attachment))
    }

    /// Image reference, if any.
    #[must_use]
    pub fn image(&self) -> Option<&str> {
        match &self.attachment {
            Some(Attachment::Image(source)) => Some(source),
            _ => None,
        }
    }

    /// Raw audio output, if any.
    #[must_use]
    pub fn audio(&self) -> Option<&str> {
        match &self.attachment {
            Some(Attachment::Audio(source)) => Some(source),
            _ => None,
        }
    }
}
