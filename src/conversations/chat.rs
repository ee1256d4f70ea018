//! Chat dispatch: turns a sent message into a generation request.
//!
//! Routing is decided by the active conversation title:
//! - the image title runs the image command,
//! - the audio title runs the speech command,
//! - a chat model whose name contains the title gets a text request,
//! - a vision model whose name contains the title gets the images too,
//! - anything else records the user message and stops.
//!
//! Generation failures never escape as errors: they become assistant
//! messages so the conversation shows what happened.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bridge::{CommandError, CommandExecutor};
use crate::core::config::{ModelProfile, ModelRegistry};
use crate::core::ids::ConversationId;
use crate::llm::{GenerateRequest, OllamaError, TextGenerator};

use super::store::SharedConversationStore;
use super::types::{Attachment, Message};

/// Prefix of assistant messages reporting a failed request.
pub const ERROR_REPLY_PREFIX: &str = "Sorry, something went wrong";

/// Reasons a message was not sent at all.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    /// A request is already in flight.
    #[error("a reply is still being generated")]
    Busy,
    /// No existing conversation is selected.
    #[error("no active conversation")]
    NoActiveConversation,
    /// Nothing to send: blank text and no images.
    #[error("message is empty")]
    EmptyMessage,
}

/// Failure of the generation step, reported inside the conversation.
#[derive(Debug, Error)]
enum ReplyError {
    #[error(transparent)]
    Generation(#[from] OllamaError),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Backend chosen for a conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// Image generation command.
    Image,
    /// Speech synthesis command.
    Audio,
    /// Text model.
    Chat(ModelProfile),
    /// Vision model receiving the attached images.
    Vision(ModelProfile),
    /// No backend; the user message is only recorded.
    Unrouted,
}

impl Route {
    /// Resolve the backend for a conversation title.
    ///
    /// A blank title names no model and stays unrouted.
    #[must_use]
    pub fn resolve(title: &str, models: &ModelRegistry) -> Self {
        if title.trim().is_empty() {
            return Self::Unrouted;
        }
        if title == models.image_title {
            return Self::Image;
        }
        if title == models.audio_title {
            return Self::Audio;
        }
        let needle = title.to_lowercase();
        let matches = |profile: &&ModelProfile| profile.name.to_lowercase().contains(&needle);
        if let Some(profile) = models.chat_models.iter().find(matches) {
            return Self::Chat(profile.clone());
        }
        if let Some(profile) = models.vision_models.iter().find(matches) {
            return Self::Vision(profile.clone());
        }
        Self::Unrouted
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Chat(_) => "chat",
            Self::Vision(_) => "vision",
            Self::Unrouted => "unrouted",
        }
    }
}

/// Result of an accepted send.
#[derive(Clone, Debug, Serialize)]
pub struct SendOutcome {
    /// Conversation the messages were appended to.
    pub conversation_id: ConversationId,
    /// Request sequence number.
    pub request: u64,
    /// The recorded user message.
    pub user_message: Message,
    /// Assistant reply or error message; `None` when unrouted.
    pub reply: Option<Message>,
}

/// Clears the typing flag when dropped.
struct TypingGuard<'a>(&'a AtomicBool);

impl<'a> TypingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for TypingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sends user messages and records the replies.
pub struct ChatController {
    store: SharedConversationStore,
    generator: Arc<dyn TextGenerator>,
    executor: Arc<dyn CommandExecutor>,
    models: ModelRegistry,
    typing: AtomicBool,
    sequence: AtomicU64,
}

impl ChatController {
    /// Create a controller over a shared store.
    #[must_use]
    pub fn new(
        store: SharedConversationStore,
        generator: Arc<dyn TextGenerator>,
        executor: Arc<dyn CommandExecutor>,
        models: ModelRegistry,
    ) -> Self {
        Self {
            store,
            generator,
            executor,
            models,
            typing: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
        }
    }

    /// Shared store handle.
    #[must_use]
    pub const fn store(&self) -> &SharedConversationStore {
        &self.store
    }

    /// Whether a reply is being generated.
    #[must_use]
    pub fn is_typing(&self) -> bool {
        self.typing.load(Ordering::Acquire)
    }

    /// Send a message to the active conversation.
    ///
    /// `images` are base64 payloads, forwarded to vision models only.
    ///
    /// # Errors
    /// Returns [`ChatError`] when the message is rejected before anything is
    /// recorded. Generation failures are appended as assistant messages.
    pub async fn send_message(
        &self,
        content: impl Into<String>,
        images: Vec<String>,
    ) -> Result<SendOutcome, ChatError> {
        let content = content.into();
        if content.trim().is_empty() && images.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let Some(_typing) = TypingGuard::acquire(&self.typing) else {
            return Err(ChatError::Busy);
        };

        let user_message = Message::user(content.clone());
        let (conversation_id, route) = {
            let mut store = self.store.write().await;
            let Some(conversation) = store.active_conversation() else {
                return Err(ChatError::NoActiveConversation);
            };
            let conversation_id = conversation.id;
            let route = Route::resolve(conversation.display_title(), &self.models);
            store.append_message(conversation_id, user_message.clone());
            (conversation_id, route)
        };
        let request = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;

        info!(request, conversation = %conversation_id, route = route.label(), "dispatching message");

        let reply = match self.dispatch(&route, &content, images).await {
            Some(Ok(message)) => {
                debug!(request, "reply received");
                Some(message)
            }
            Some(Err(err)) => {
                warn!(request, conversation = %conversation_id, error = %err, "generation failed");
                Some(Message::assistant(format!("{ERROR_REPLY_PREFIX}: {err}")))
            }
            None => None,
        };

        if let Some(message) = &reply {
            let mut store = self.store.write().await;
            store.append_message(conversation_id, message.clone());
        }
        info!(request, conversation = %conversation_id, replied = reply.is_some(), "request finished");

        Ok(SendOutcome {
            conversation_id,
            request,
            user_message,
            reply,
        })
    }

    async fn dispatch(
        &self,
        route: &Route,
        content: &str,
        images: Vec<String>,
    ) -> Option<Result<Message, ReplyError>> {
        let result = match route {
            Route::Image => self
                .executor
                .generate_image(content)
                .await
                .map(|source| Message::assistant_attachment(Attachment::Image(source)))
                .map_err(ReplyError::from),
            Route::Audio => self
                .executor
                .generate_audio(
                    content,
                    &self.models.audio_speaker,
                    &self.models.audio_language,
                )
                .await
                .map(|output| Message::assistant_attachment(Attachment::Audio(output)))
                .map_err(ReplyError::from),
            Route::Chat(profile) => self
                .generator
                .generate(GenerateRequest::new(&profile.name, prompt_for(content, profile)))
                .await
                .map(Message::assistant)
                .map_err(ReplyError::from),
            Route::Vision(profile) => self
                .generator
                .generate(
                    GenerateRequest::new(&profile.name, prompt_for(content, profile))
                        .with_images(images),
                )
                .await
                .map(Message::assistant)
                .map_err(ReplyError::from),
            Route::Unrouted => return None,
        };
        Some(result)
    }
}

fn prompt_for(content: &str, profile: &ModelProfile) -> String {
    format!("{content} {}", profile.system_prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;
    use tokio::sync::Notify;

    use crate::bridge::{CommandFuture, CommandResult};
    use crate::conversations::store::ConversationStore;
    use crate::conversations::types::Sender;
    use crate::core::config::OllamaConfig;
    use crate::llm::{GenerateFuture, OllamaClient};

    #[derive(Default)]
    struct FakeGenerator {
        reply: Option<String>,
        gate: Option<Arc<Notify>>,
        requests: Mutex<Vec<GenerateRequest>>,
    }

    impl FakeGenerator {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                ..Self::default()
            }
        }
    }

    impl TextGenerator for FakeGenerator {
        fn generate(
            &self,
            request: GenerateRequest,
        ) -> GenerateFuture<'_, Result<String, OllamaError>> {
            Box::pin(async move {
                self.requests.lock().unwrap().push(request);
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                self.reply.clone().ok_or(OllamaError::MalformedResponse)
            })
        }
    }

    #[derive(Default)]
    struct FakeExecutor {
        fail: bool,
    }

    impl CommandExecutor for FakeExecutor {
        fn generate_image(&self, prompt: &str) -> CommandFuture<'_, CommandResult<String>> {
            let prompt = prompt.to_string();
            Box::pin(async move {
                if self.fail {
                    return Err(CommandError::Failed("CUDA out of memory".to_string()));
                }
                Ok(format!("/generated/{}.png", prompt.replace(' ', "_")))
            })
        }

        fn generate_audio(
            &self,
            text: &str,
            speaker: &str,
            language: &str,
        ) -> CommandFuture<'_, CommandResult<String>> {
            let line = format!("{speaker} {language} {text}\n/generated/speech.wav");
            Box::pin(async move { Ok(line) })
        }

        fn pdf_to_images(&self, _pdf: &[u8]) -> CommandFuture<'_, CommandResult<Vec<String>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    async fn controller_for(
        title: &str,
        generator: Arc<dyn TextGenerator>,
        executor: FakeExecutor,
    ) -> (ChatController, ConversationId) {
        let store = ConversationStore::new().into_shared();
        let id = {
            let mut guard = store.write().await;
            let id = guard.create_conversation();
            guard.rename_conversation(id, title);
            id
        };
        let controller = ChatController::new(
            store,
            generator,
            Arc::new(executor),
            ModelRegistry::default(),
        );
        (controller, id)
    }

    #[test]
    fn test_route_resolution() {
        let models = ModelRegistry::default();
        assert_eq!(Route::resolve("SDXL", &models), Route::Image);
        assert_eq!(Route::resolve("TTS", &models), Route::Audio);
        assert!(matches!(
            Route::resolve("GEMMA", &models),
            Route::Chat(profile) if profile.name == "gemma:2b"
        ));
        assert!(matches!(
            Route::resolve("qwen2.5vl:7b", &models),
            Route::Vision(profile) if profile.name == "qwen2.5vl:7b"
        ));
        assert_eq!(Route::resolve("mistral", &models), Route::Unrouted);
        assert_eq!(Route::resolve("", &models), Route::Unrouted);
        assert_eq!(Route::resolve("  ", &models), Route::Unrouted);
        assert_eq!(Route::resolve("New Chat", &models), Route::Unrouted);
    }

    #[tokio::test]
    async fn test_new_conversation_records_user_message_only() {
        let generator = Arc::new(FakeGenerator::replying("should not be used"));
        let store = ConversationStore::new().into_shared();
        let id = store.write().await.create_conversation();
        let controller = ChatController::new(
            store,
            generator.clone(),
            Arc::new(FakeExecutor::default()),
            ModelRegistry::default(),
        );

        let outcome = controller.send_message("hello", Vec::new()).await.unwrap();
        assert_eq!(outcome.conversation_id, id);
        assert!(outcome.reply.is_none());
        assert_eq!(controller.store().read().await.messages(id).len(), 1);
        assert!(generator.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_text_reply() {
        let generator = Arc::new(FakeGenerator::replying("hi there"));
        let (controller, id) =
            controller_for("tinyllama", generator.clone(), FakeExecutor::default()).await;

        let outcome = controller.send_message("hello", Vec::new()).await.unwrap();
        assert_eq!(outcome.conversation_id, id);
        assert_eq!(outcome.request, 1);
        assert!(!controller.is_typing());

        let store = controller.store().read().await;
        let messages = store.messages(id);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[1].sender, Sender::Assistant);
        assert_eq!(messages[1].content, "hi there");
        assert_eq!(
            store.get(id).map(|c| c.last_message_preview.as_str()),
            Some("hi there")
        );

        let requests = generator.requests.lock().unwrap();
        assert_eq!(requests[0].model, "tinyllama");
        assert_eq!(requests[0].prompt, "hello test");
        assert!(requests[0].images.is_none());
    }

    #[tokio::test]
    async fn test_server_error_becomes_assistant_message() {
        let router = Router::new().route(
            "/api/generate",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        let client = OllamaClient::new(&OllamaConfig {
            base_url: format!("http://{addr}"),
            ..OllamaConfig::default()
        })
        .unwrap();

        let (controller, id) =
            controller_for("gemma:2b", Arc::new(client), FakeExecutor::default()).await;
        let outcome = controller.send_message("hello", Vec::new()).await.unwrap();
        assert!(!controller.is_typing());

        let reply = outcome.reply.unwrap();
        assert_eq!(reply.sender, Sender::Assistant);
        assert!(reply.content.starts_with(ERROR_REPLY_PREFIX));
        assert!(reply.content.contains("500"));

        let store = controller.store().read().await;
        assert_eq!(store.messages(id).len(), 2);
    }

    #[tokio::test]
    async fn test_vision_route_forwards_images() {
        let generator = Arc::new(FakeGenerator::replying("x = 4"));
        let (controller, _) =
            controller_for("qwen2.5vl:7b", generator.clone(), FakeExecutor::default()).await;
        controller
            .send_message("solve", vec!["aGVsbG8=".to_string()])
            .await
            .unwrap();
        controller.send_message("describe", Vec::new()).await.unwrap();

        let requests = generator.requests.lock().unwrap();
        assert_eq!(requests[0].images.as_deref(), Some(&["aGVsbG8=".to_string()][..]));
        assert!(requests[1].images.is_none());
        let body = serde_json::to_value(&requests[1]).unwrap();
        assert!(body.get("images").is_none());
    }

    #[tokio::test]
    async fn test_image_and_audio_routes() {
        let generator: Arc<dyn TextGenerator> = Arc::new(FakeGenerator::default());
        let (controller, id) =
            controller_for("SDXL", generator.clone(), FakeExecutor::default()).await;
        let outcome = controller.send_message("a cat", Vec::new()).await.unwrap();
        let reply = outcome.reply.unwrap();
        assert_eq!(reply.image(), Some("/generated/a_cat.png"));
        assert!(reply.content.is_empty());
        assert_eq!(
            controller.store().read().await.get(id).map(|c| c.last_message_preview.clone()),
            Some(String::new())
        );

        let (controller, _) = controller_for("TTS", generator, FakeExecutor::default()).await;
        let outcome = controller.send_message("hi", Vec::new()).await.unwrap();
        let audio = outcome.reply.unwrap();
        let raw = audio.audio().unwrap();
        assert!(raw.starts_with("Damien Black en hi"));
        assert_eq!(
            crate::render::extract_audio_source(raw),
            Some("/generated/speech.wav")
        );
    }

    #[tokio::test]
    async fn test_command_failure_reported() {
        let generator: Arc<dyn TextGenerator> = Arc::new(FakeGenerator::default());
        let (controller, _) =
            controller_for("SDXL", generator, FakeExecutor { fail: true }).await;
        let outcome = controller.send_message("a cat", Vec::new()).await.unwrap();
        let reply = outcome.reply.unwrap();
        assert!(reply.content.contains("CUDA out of memory"));
        assert!(reply.attachment.is_none());
    }

    #[tokio::test]
    async fn test_unrouted_records_user_message_only() {
        let generator: Arc<dyn TextGenerator> = Arc::new(FakeGenerator::default());
        let (controller, id) =
            controller_for("mistral", generator, FakeExecutor::default()).await;
        let outcome = controller.send_message("hello", Vec::new()).await.unwrap();
        assert!(outcome.reply.is_none());
        assert_eq!(controller.store().read().await.messages(id).len(), 1);
    }

    #[tokio::test]
    async fn test_rejections() {
        let generator: Arc<dyn TextGenerator> = Arc::new(FakeGenerator::default());
        let controller = ChatController::new(
            ConversationStore::new().into_shared(),
            generator,
            Arc::new(FakeExecutor::default()),
            ModelRegistry::default(),
        );
        assert_eq!(
            controller.send_message("   ", Vec::new()).await.unwrap_err(),
            ChatError::EmptyMessage
        );
        assert_eq!(
            controller.send_message("hello", Vec::new()).await.unwrap_err(),
            ChatError::NoActiveConversation
        );
        assert!(!controller.is_typing());
    }

    #[tokio::test]
    async fn test_second_send_while_busy_is_rejected() {
        let gate = Arc::new(Notify::new());
        let generator = Arc::new(FakeGenerator {
            reply: Some("first".to_string()),
            gate: Some(gate.clone()),
            ..FakeGenerator::default()
        });
        let (controller, id) =
            controller_for("tinyllama", generator, FakeExecutor::default()).await;
        let controller = Arc::new(controller);

        let pending = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.send_message("one", Vec::new()).await })
        };
        while !controller.is_typing() {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            controller.send_message("two", Vec::new()).await.unwrap_err(),
            ChatError::Busy
        );

        gate.notify_one();
        let outcome = pending.await.unwrap().unwrap();
        assert_eq!(outcome.reply.map(|m| m.content), Some("first".to_string()));
        assert!(!controller.is_typing());

        let store = controller.store().read().await;
        let contents: Vec<_> = store.messages(id).iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "first"]);
    }
}
