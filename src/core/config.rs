//! Configuration for the chat core.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::errors::{CoreError, CoreResult};

/// Environment variable overriding the Ollama base URL.
pub const OLLAMA_URL_ENV: &str = "CHATDESK_OLLAMA_URL";
/// Environment variable overriding the HTTP shell port.
pub const PORT_ENV: &str = "CHATDESK_PORT";
/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CHATDESK_DATA_DIR";
/// Environment variable overriding the generation script path.
pub const SCRIPT_ENV: &str = "CHATDESK_SCRIPT";

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Inference server settings.
    pub ollama: OllamaConfig,
    /// HTTP shell settings.
    pub server: ServerConfig,
    /// On-disk storage settings.
    pub storage: StorageConfig,
    /// Native command bridge settings.
    pub bridge: BridgeConfig,
    /// Model routing table.
    pub models: ModelRegistry,
    /// Conversations created at start-up.
    pub seeds: SeedConfig,
}

impl ChatConfig {
    /// Build the default configuration with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(OLLAMA_URL_ENV) {
            config.ollama.base_url = url;
        }
        if let Some(port) = std::env::var(PORT_ENV).ok().and_then(|p| p.parse().ok()) {
            config.server.port = port;
        }
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            config.storage.data_dir = PathBuf::from(dir);
        }
        if let Ok(script) = std::env::var(SCRIPT_ENV) {
            config.bridge.script = PathBuf::from(script);
        }

        config
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> CoreResult<()> {
        Url::parse(&self.ollama.base_url)?;

        if self.ollama.request_timeout_secs == 0 {
            return Err(CoreError::InvalidConfig(
                "ollama.request_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.models.chat_models.is_empty() && self.models.vision_models.is_empty() {
            return Err(CoreError::InvalidConfig(
                "models must list at least one chat or vision model".to_string(),
            ));
        }

        if self.storage.agents_namespace.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "storage.agents_namespace must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Inference server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL of the Ollama HTTP API.
    pub base_url: String,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: 120,
        }
    }
}

/// HTTP shell settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
    /// Directory of front-end assets served for unmatched paths.
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            static_dir: PathBuf::from("static"),
        }
    }
}

/// On-disk storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the key-value database.
    pub data_dir: PathBuf,
    /// Key-value database file name.
    pub kv_file: String,
    /// Namespace used for installed-agent selections.
    pub agents_namespace: String,
}

impl StorageConfig {
    /// Full path of the key-value database.
    #[must_use]
    pub fn kv_path(&self) -> PathBuf {
        self.data_dir.join(&self.kv_file)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            kv_file: "chatdesk.sqlite".to_string(),
            agents_namespace: "agents".to_string(),
        }
    }
}

/// Native command bridge settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Interpreter used to run the generation script.
    pub interpreter: String,
    /// Generation script path.
    pub script: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            script: PathBuf::from("inference.py"),
        }
    }
}

/// A text model and the system prompt appended to every request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Model name as installed in Ollama.
    pub name: String,
    /// Suffix appended to the user prompt.
    pub system_prompt: String,
}

impl ModelProfile {
    /// Build a profile.
    #[must_use]
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
        }
    }
}

/// Routing table from conversation titles to backends.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelRegistry {
    /// Text-only models.
    pub chat_models: Vec<ModelProfile>,
    /// Models accepting image attachments.
    pub vision_models: Vec<ModelProfile>,
    /// Conversation title routed to image generation.
    pub image_title: String,
    /// Conversation title routed to speech synthesis.
    pub audio_title: String,
    /// Speaker passed to speech synthesis.
    pub audio_speaker: String,
    /// Language passed to speech synthesis.
    pub audio_language: String,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self {
            chat_models: vec![
                ModelProfile::new("tinyllama", "test"),
                ModelProfile::new("deepseek-coder:6.7b", "test"),
                ModelProfile::new("gemma:2b", "test"),
                ModelProfile::new("deepseek-coder-v2:16b", "test"),
                ModelProfile::new("codellama:13b", "test"),
            ],
            vision_models: vec![ModelProfile::new(
                "qwen2.5vl:7b",
                "und pack die Antwort in ```math und ende mit ```.",
            )],
            image_title: "SDXL".to_string(),
            audio_title: "TTS".to_string(),
            audio_speaker: "Damien Black".to_string(),
            audio_language: "en".to_string(),
        }
    }
}

/// A conversation created at start-up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedConversation {
    /// Title, which doubles as the routing key.
    pub title: String,
    /// Optional icon reference.
    pub icon: Option<String>,
}

impl SeedConversation {
    fn new(title: &str, icon: &str) -> Self {
        Self {
            title: title.to_string(),
            icon: Some(icon.to_string()),
        }
    }
}

/// Start-up conversations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Conversations in sidebar order.
    pub conversations: Vec<SeedConversation>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            conversations: vec![
                SeedConversation::new("tinyllama", "/assets/ollama.png"),
                SeedConversation::new("SDXL", "/assets/Stability.png"),
                SeedConversation::new("deepseek-coder-v2:16b", "/assets/Deepseek.png"),
                SeedConversation::new("TTS", "/assets/XTTS.jpg"),
                SeedConversation::new("gemma:2b", "/assets/Gemma.jpg"),
                SeedConversation::new("codellama:13b", "/assets/ollama.png"),
                SeedConversation::new("qwen2.5vl:7b", "/assets/Qwen.png"),
            ],
        }
    }
}
