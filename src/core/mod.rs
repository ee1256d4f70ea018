//! Core configuration, errors and identifiers.

pub mod config;
pub mod errors;
pub mod ids;

pub use config::{
    BridgeConfig, ChatConfig, ModelProfile, ModelRegistry, OllamaConfig, SeedConfig,
    SeedConversation, ServerConfig, StorageConfig,
};
pub use errors::{CoreError, CoreResult};
pub use ids::{ConversationId, MessageId};
