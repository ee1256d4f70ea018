//! Application state shared across all request handlers.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::agents::{KeyValueStore, Marketplace, SqliteKeyValueStore};
use crate::bridge::{CommandExecutor, ProcessCommandExecutor};
use crate::conversations::{ChatController, ConversationStore, SharedConversationStore};
use crate::core::config::ChatConfig;
use crate::llm::{OllamaClient, TextGenerator};

/// Shared application state.
pub struct AppState {
    /// Conversation store, shared with the controller.
    pub store: SharedConversationStore,
    /// Chat dispatch.
    pub chat: ChatController,
    /// Agent marketplace.
    pub marketplace: RwLock<Marketplace>,
    /// Ollama client used for model listing.
    pub ollama: OllamaClient,
    /// Native command bridge used for attachments.
    pub executor: Arc<dyn CommandExecutor>,
}

impl AppState {
    /// Build the state from configuration.
    ///
    /// Seeds the conversation store, opens the key-value database and
    /// wires the process-backed command bridge.
    ///
    /// # Errors
    /// Returns an error if the Ollama client or the database cannot be created.
    pub async fn new(
        config: &ChatConfig,
    ) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let ollama = OllamaClient::new(&config.ollama)
            .map_err(|e| format!("Failed to create Ollama client: {e}"))?;

        tokio::fs::create_dir_all(&config.storage.data_dir).await?;
        let kv: Arc<dyn KeyValueStore> =
            Arc::new(SqliteKeyValueStore::open(config.storage.kv_path()).await?);
        let marketplace = Marketplace::load(kv, config.storage.agents_namespace.clone()).await?;

        let executor: Arc<dyn CommandExecutor> =
            Arc::new(ProcessCommandExecutor::new(&config.bridge));
        let store = ConversationStore::with_seed(&config.seeds.conversations).into_shared();

        info!(
            conversations = config.seeds.conversations.len(),
            kv = %config.storage.kv_path().display(),
            "application state ready"
        );

        Ok(Self::from_parts(
            store,
            Arc::new(ollama.clone()),
            ollama,
            executor,
            marketplace,
            config,
        ))
    }

    /// Assemble the state from already-built parts.
    #[must_use]
    pub fn from_parts(
        store: SharedConversationStore,
        generator: Arc<dyn TextGenerator>,
        ollama: OllamaClient,
        executor: Arc<dyn CommandExecutor>,
        marketplace: Marketplace,
        config: &ChatConfig,
    ) -> Arc<Self> {
        let chat = ChatController::new(
            store.clone(),
            generator,
            executor.clone(),
            config.models.clone(),
        );
        Arc::new(Self {
            store,
            chat,
            marketplace: RwLock::new(marketplace),
            ollama,
            executor,
        })
    }
}
