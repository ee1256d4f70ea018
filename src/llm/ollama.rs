//! Async Ollama client for text generation and model discovery.
//!
//! Behaviour:
//! - `POST /api/generate` with `stream: false`, optionally carrying base64 images.
//! - `GET /api/tags` to list installed models.
//! - `POST /api/pull` / `DELETE /api/delete` to install or remove a model.
//! - `GET /api/version` as a readiness probe.
//!
//! A non-2xx status, an absent `response` field or an empty one are all
//! failures; callers never receive an empty reply.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::config::OllamaConfig;

/// Boxed future type for generator operations.
pub type GenerateFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors produced by the Ollama client.
#[derive(Debug, Error)]
pub enum OllamaError {
    /// HTTP transport failure (unreachable, timeout, body decode).
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    /// HTTP response was not a success.
    #[error("HTTP error! status: {0}")]
    HttpStatusNotOk(u16),
    /// The response did not carry a usable `response` field.
    #[error("ollama response malformed: missing response text")]
    MalformedResponse,
    /// The configured base URL is invalid.
    #[error("invalid ollama url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Body of a `/api/generate` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GenerateRequest {
    /// Model name as installed in Ollama.
    pub model: String,
    /// Full prompt text.
    pub prompt: String,
    /// Always `false`; the client waits for the whole reply.
    pub stream: bool,
    /// Base64 images for vision models.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl GenerateRequest {
    /// Build a non-streaming text request.
    #[must_use]
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            stream: false,
            images: None,
        }
    }

    /// Attach base64 images. An empty list leaves the field out.
    #[must_use]
    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = (!images.is_empty()).then_some(images);
        self
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Serialize)]
struct ModelRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// Trait abstraction over text generation backends.
pub trait TextGenerator: Send + Sync {
    /// Generate a complete reply for the request.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-2xx status or a missing reply.
    fn generate(&self, request: GenerateRequest) -> GenerateFuture<'_, Result<String, OllamaError>>;
}

/// Model lifecycle on the inference server.
pub trait ModelManager: Send + Sync {
    /// Names of the installed models.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-2xx status.
    fn installed_models(&self) -> GenerateFuture<'_, Result<Vec<String>, OllamaError>>;

    /// Download a model and wait until it is installed.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-2xx status.
    fn pull_model<'a>(&'a self, model: &'a str) -> GenerateFuture<'a, Result<(), OllamaError>>;

    /// Remove an installed model. Removing an absent model succeeds.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-2xx status.
    fn delete_model<'a>(&'a self, model: &'a str) -> GenerateFuture<'a, Result<(), OllamaError>>;
}

/// Ollama HTTP client.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(config: &OllamaConfig) -> Result<Self, OllamaError> {
        url::Url::parse(&config.base_url)?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check whether the server answers `GET /api/version`.
    ///
    /// # Errors
    /// Returns an error if the server cannot be reached.
    pub async fn is_ready(&self) -> Result<bool, OllamaError> {
        let url = format!("{}/api/version", self.base_url);
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    /// List installed model names via `GET /api/tags`.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-2xx status.
    pub async fn list_models(&self) -> Result<Vec<String>, OllamaError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OllamaError::HttpStatusNotOk(status.as_u16()));
        }
        let tags = response.json::<TagsResponse>().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn post_pull(&self, model: &str) -> Result<(), OllamaError> {
        let url = format!("{}/api/pull", self.base_url);
        info!(model, "pulling model");
        let body = ModelRequest {
            model,
            stream: Some(false),
        };
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OllamaError::HttpStatusNotOk(status.as_u16()));
        }
        Ok(())
    }

    async fn send_delete(&self, model: &str) -> Result<(), OllamaError> {
        let url = format!("{}/api/delete", self.base_url);
        info!(model, "deleting model");
        let body = ModelRequest {
            model,
            stream: None,
        };
        let response = self.client.delete(&url).json(&body).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(model, "model already absent");
            return Ok(());
        }
        if !status.is_success() {
            return Err(OllamaError::HttpStatusNotOk(status.as_u16()));
        }
        Ok(())
    }

    async fn post_generate(&self, request: GenerateRequest) -> Result<String, OllamaError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(model = %request.model, images = request.images.as_ref().map_or(0, Vec::len), "posting generate request");

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OllamaError::HttpStatusNotOk(status.as_u16()));
        }

        let body = response.json::<GenerateResponse>().await?;
        match body.response {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(OllamaError::MalformedResponse),
        }
    }
}

impl TextGenerator for OllamaClient {
    fn generate(&self, request: GenerateRequest) -> GenerateFuture<'_, Result<String, OllamaError>> {
        Box::pin(self.post_generate(request))
    }
}

impl ModelManager for OllamaClient {
    fn installed_models(&self) -> GenerateFuture<'_, Result<Vec<String>, OllamaError>> {
        Box::pin(self.list_models())
    }

    fn pull_model<'a>(&'a self, model: &'a str) -> GenerateFuture<'a, Result<(), OllamaError>> {
        Box::pin(self.post_pull(model))
    }

    fn delete_model<'a>(&'a self, model: &'a str) -> GenerateFuture<'a, Result<(), OllamaError>> {
        Box::pin(self.send_delete(model))
    }
}
