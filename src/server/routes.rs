//! HTTP route handlers for the chat API.

use std::path::Path;
use std::sync::Arc;

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use tracing::warn;

use crate::agents::{Agent, CATEGORIES, Category, MarketplaceError};
use crate::conversations::{ChatError, Composer, Conversation, Message, SendOutcome};
use crate::core::ids::ConversationId;
use crate::render::{MessageWindow, PAGE_SIZE, Segment, extract_audio_source, split_segments};

use super::state::AppState;

type ApiError = (StatusCode, String);

/// Create the API router with all routes.
///
/// Unmatched paths are served from `static_dir`.
pub fn create_router(state: Arc<AppState>, static_dir: &Path) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/conversations/{id}",
            patch(rename_conversation).delete(delete_conversation),
        )
        .route("/api/conversations/{id}/select", post(select_conversation))
        .route("/api/conversations/{id}/messages", get(list_messages))
        .route("/api/chat", post(send_chat))
        .route("/api/attachments", post(add_attachment))
        .route("/api/agents", get(list_agents))
        .route("/api/agents/refresh", post(refresh_agents))
        .route(
            "/api/agents/{id}/install",
            post(install_agent).delete(uninstall_agent),
        )
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chatdesk",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Sidebar entry.
#[derive(Debug, Serialize)]
pub struct ConversationDto {
    /// Conversation id.
    pub id: ConversationId,
    /// Title with the untitled fallback applied.
    pub title: String,
    /// Preview with the empty fallback applied.
    pub preview: String,
    /// Optional icon reference.
    pub icon: Option<String>,
    /// Whether this is the active conversation.
    pub active: bool,
}

impl ConversationDto {
    fn from_conversation(conversation: &Conversation, active: Option<ConversationId>) -> Self {
        Self {
            id: conversation.id,
            title: conversation.display_title().to_string(),
            preview: conversation.display_preview().to_string(),
            icon: conversation.icon.clone(),
            active: active == Some(conversation.id),
        }
    }
}

/// Sidebar listing.
#[derive(Debug, Serialize)]
pub struct ConversationList {
    /// Matching conversations in sidebar order.
    pub conversations: Vec<ConversationDto>,
    /// Active conversation id.
    pub active: Option<ConversationId>,
}

/// Sidebar search parameters.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    /// Case-insensitive filter on title and preview.
    pub q: Option<String>,
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Json<ConversationList> {
    let store = state.store.read().await;
    let active = store.active();
    let conversations = store
        .search(params.q.as_deref().unwrap_or_default())
        .into_iter()
        .map(|c| ConversationDto::from_conversation(c, active))
        .collect();
    Json(ConversationList {
        conversations,
        active,
    })
}

async fn create_conversation(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<ConversationDto>), ApiError> {
    let mut store = state.store.write().await;
    let id = store.create_conversation();
    let conversation = store
        .get(id)
        .map(|c| ConversationDto::from_conversation(c, Some(id)))
        .ok_or_else(|| (StatusCode::INTERNAL_SERVER_ERROR, "conversation vanished".to_string()))?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// Rename request.
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    /// New title.
    pub title: String,
}

async fn rename_conversation(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<ConversationId>,
    Json(request): Json<RenameRequest>,
) -> StatusCode {
    if state.store.write().await.rename_conversation(id, request.title) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<ConversationId>,
) -> StatusCode {
    if state.store.write().await.delete_conversation(id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn select_conversation(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<ConversationId>,
) -> StatusCode {
    state.store.write().await.select_conversation(id);
    StatusCode::NO_CONTENT
}

/// Message with its render decomposition.
#[derive(Debug, Serialize)]
pub struct MessageDto {
    /// Stored message.
    #[serde(flatten)]
    pub message: Message,
    /// Text and code segments of the content.
    pub segments: Vec<Segment>,
    /// Playable asset path for audio messages.
    pub audio_source: Option<String>,
}

impl From<&Message> for MessageDto {
    fn from(message: &Message) -> Self {
        Self {
            message: message.clone(),
            segments: split_segments(&message.content),
            audio_source: message
                .audio()
                .and_then(extract_audio_source)
                .map(ToString::to_string),
        }
    }
}

/// Window query parameters.
#[derive(Debug, Deserialize)]
pub struct WindowParams {
    /// First index to return; defaults to the initial window.
    pub start: Option<usize>,
}

/// A window of messages.
#[derive(Debug, Serialize)]
pub struct MessagePage {
    /// Total messages in the conversation.
    pub total: usize,
    /// Index of the first returned message.
    pub start: usize,
    /// Whether older messages exist.
    pub has_more: bool,
    /// Count for the "Load N earlier messages" control.
    pub load_more_count: usize,
    /// Messages from `start` to the end.
    pub messages: Vec<MessageDto>,
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<ConversationId>,
    Query(params): Query<WindowParams>,
) -> Json<MessagePage> {
    let store = state.store.read().await;
    let messages = store.messages(id);
    let total = messages.len();
    let start = params
        .start
        .unwrap_or_else(|| MessageWindow::new(Some(id), total).visible_start())
        .min(total);
    Json(MessagePage {
        total,
        start,
        has_more: start > 0,
        load_more_count: PAGE_SIZE.min(start),
        messages: messages[start..].iter().map(MessageDto::from).collect(),
    })
}

/// Chat request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The user's message.
    pub content: String,
    /// Base64 images for vision models.
    #[serde(default)]
    pub images: Vec<String>,
}

async fn send_chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<SendOutcome>, ApiError> {
    state
        .chat
        .send_message(request.content, request.images)
        .await
        .map(Json)
        .map_err(|e| {
            let status = match e {
                ChatError::Busy | ChatError::NoActiveConversation => StatusCode::CONFLICT,
                ChatError::EmptyMessage => StatusCode::BAD_REQUEST,
            };
            (status, e.to_string())
        })
}

/// Kind of uploaded file.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadKind {
    /// A single image.
    Image,
    /// A PDF document, rasterized page by page.
    Pdf,
}

/// Attachment upload.
#[derive(Debug, Deserialize)]
pub struct AttachmentRequest {
    /// Original file name.
    pub name: String,
    /// File kind.
    pub kind: UploadKind,
    /// Base64 file content, or a data URL for images.
    pub data: String,
}

/// Attachments ready to send.
#[derive(Debug, Serialize)]
pub struct AttachmentResponse {
    /// Base64 payloads to pass to `/api/chat`.
    pub images: Vec<String>,
    /// Preview data URLs, one per image.
    pub previews: Vec<String>,
    /// Status line.
    pub summary: Option<String>,
}

async fn add_attachment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AttachmentRequest>,
) -> Result<Json<AttachmentResponse>, ApiError> {
    let mut composer = Composer::new();
    match request.kind {
        UploadKind::Image => composer
            .add_image_base64(request.name, &request.data)
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?,
        UploadKind::Pdf => {
            let pdf = STANDARD
                .decode(request.data.trim())
                .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid pdf payload: {e}")))?;
            composer
                .add_pdf(request.name, &pdf, state.executor.as_ref())
                .await
                .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;
        }
    }

    Ok(Json(AttachmentResponse {
        previews: composer.images().iter().map(|i| i.preview()).collect(),
        summary: composer.summary(),
        images: composer.images().iter().map(|i| i.data.clone()).collect(),
    }))
}

/// Marketplace query parameters.
#[derive(Debug, Deserialize)]
pub struct AgentParams {
    /// Category label; `All` or absent for every category.
    pub category: Option<String>,
    /// Search text.
    pub q: Option<String>,
}

/// Marketplace listing.
#[derive(Debug, Serialize)]
pub struct AgentList {
    /// Category labels for the filter control.
    pub categories: Vec<&'static str>,
    /// Matching agents.
    pub agents: Vec<Agent>,
}

async fn list_agents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AgentParams>,
) -> Result<Json<AgentList>, ApiError> {
    let category = match params.category.as_deref() {
        Some(label) => Category::parse_filter(label)
            .map_err(|unknown| (StatusCode::BAD_REQUEST, format!("unknown category: {unknown}")))?,
        None => None,
    };
    let marketplace = state.marketplace.read().await;
    let agents = marketplace
        .filter(category, params.q.as_deref().unwrap_or_default())
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(AgentList {
        categories: CATEGORIES.to_vec(),
        agents,
    }))
}

async fn refresh_agents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Agent>>, ApiError> {
    let models = state.ollama.list_models().await.map_err(|e| {
        warn!("model listing failed: {e}");
        (StatusCode::BAD_GATEWAY, e.to_string())
    })?;
    let mut marketplace = state.marketplace.write().await;
    marketplace.refresh_installed(&models);
    Ok(Json(marketplace.agents().to_vec()))
}

async fn install_agent(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<Agent>, ApiError> {
    set_installed(&state, &id, true).await
}

async fn uninstall_agent(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<Agent>, ApiError> {
    set_installed(&state, &id, false).await
}

async fn set_installed(state: &AppState, id: &str, installed: bool) -> Result<Json<Agent>, ApiError> {
    let mut marketplace = state.marketplace.write().await;
    let result = if installed {
        marketplace.install(id, &state.ollama).await
    } else {
        marketplace.uninstall(id, &state.ollama).await
    };
    let known = result.map_err(|e| {
        warn!(agent = id, installed, "agent update failed: {e}");
        let status = match e {
            MarketplaceError::Models(_) => StatusCode::BAD_GATEWAY,
            MarketplaceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, e.to_string())
    })?;
    match marketplace.get(id) {
        Some(agent) if known => Ok(Json(agent.clone())),
        _ => Err((StatusCode::NOT_FOUND, format!("unknown agent: {id}"))),
    }
}
