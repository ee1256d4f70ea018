//! Message composer: input text plus pending image attachments.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::bridge::{CommandError, CommandExecutor};

/// Data URL prefix used for attachment previews.
pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Errors raised while attaching files.
#[derive(Debug, Error)]
pub enum ComposerError {
    /// The image payload is not valid base64.
    #[error("invalid image payload: {0}")]
    InvalidImage(#[from] base64::DecodeError),
    /// PDF rasterization failed.
    #[error("pdf conversion failed: {0}")]
    Pdf(#[from] CommandError),
}

/// An image waiting to be sent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PendingImage {
    /// Raw base64 payload, as sent to vision models.
    pub data: String,
}

impl PendingImage {
    /// Preview data URL.
    #[must_use]
    pub fn preview(&self) -> String {
        format!("{PNG_DATA_URL_PREFIX}{}", self.data)
    }
}

/// What the composer hands to the chat controller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outgoing {
    /// Trimmed text.
    pub content: String,
    /// Base64 image payloads.
    pub images: Vec<String>,
}

/// Composer state of the chat view.
#[derive(Clone, Debug, Default)]
pub struct Composer {
    input: String,
    images: Vec<PendingImage>,
    file_names: Vec<String>,
}

impl Composer {
    /// Create an empty composer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the input text.
    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    /// Current input text.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Pending images in attachment order.
    #[must_use]
    pub fn images(&self) -> &[PendingImage] {
        &self.images
    }

    /// Names of the attached files, one per file.
    #[must_use]
    pub fn file_names(&self) -> &[String] {
        &self.file_names
    }

    /// Attach an image given as base64 or as a data URL.
    ///
    /// # Errors
    /// Returns an error if the payload does not decode.
    pub fn add_image_base64(
        &mut self,
        name: impl Into<String>,
        payload: &str,
    ) -> Result<(), ComposerError> {
        let data = strip_data_url(payload.trim());
        STANDARD.decode(data)?;
        self.images.push(PendingImage {
            data: data.to_string(),
        });
        self.file_names.push(name.into());
        Ok(())
    }

    /// Rasterize a PDF and attach every page as its own image.
    ///
    /// Returns the number of pages attached.
    ///
    /// # Errors
    /// Returns an error if the conversion command fails.
    pub async fn add_pdf<E: CommandExecutor + ?Sized>(
        &mut self,
        name: impl Into<String>,
        pdf: &[u8],
        executor: &E,
    ) -> Result<usize, ComposerError> {
        let name = name.into();
        let pages = executor.pdf_to_images(pdf).await?;
        let count = pages.len();
        self.images
            .extend(pages.into_iter().map(|data| PendingImage { data }));
        info!(file = %name, pages = count, "attached pdf");
        self.file_names.push(name);
        Ok(count)
    }

    /// Remove the image at `index`.
    pub fn remove(&mut self, index: usize) -> Option<PendingImage> {
        if index >= self.images.len() {
            debug!(index, "remove out of range ignored");
            return None;
        }
        Some(self.images.remove(index))
    }

    /// Whether the send control is enabled.
    #[must_use]
    pub fn can_send(&self) -> bool {
        !self.input.trim().is_empty() || !self.images.is_empty()
    }

    /// Drain input and attachments for sending.
    pub fn take(&mut self) -> Option<Outgoing> {
        if !self.can_send() {
            return None;
        }
        let content = std::mem::take(&mut self.input).trim().to_string();
        let images = std::mem::take(&mut self.images)
            .into_iter()
            .map(|image| image.data)
            .collect();
        self.file_names.clear();
        Some(Outgoing { content, images })
    }

    /// Status line under the input, e.g. `5 characters • 2 images attached`.
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        let characters = self.input.chars().count();
        let images = self.images.len();
        let mut parts = Vec::with_capacity(2);
        if characters > 0 {
            parts.push(format!("{characters} characters"));
        }
        if images > 0 {
            let plural = if images > 1 { "s" } else { "" };
            parts.push(format!("{images} image{plural} attached"));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" • "))
        }
    }
}

fn strip_data_url(payload: &str) -> &str {
    if payload.starts_with("data:") {
        payload
            .split_once(',')
            .map_or(payload, |(_, data)| data)
    } else {
        payload
    }
}
