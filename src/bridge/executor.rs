//! Typed capability interface over the native generation commands.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// Boxed future type for command operations.
pub type CommandFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors produced by native commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command process could not be started.
    #[error("failed to execute generation script: {0}")]
    Spawn(#[from] std::io::Error),
    /// The command exited with a failure status.
    #[error("generation script failed: {0}")]
    Failed(String),
    /// The command produced no output.
    #[error("no output returned from generation script")]
    EmptyOutput,
    /// The command output was not valid UTF-8.
    #[error("failed to parse output: {0}")]
    InvalidOutput(#[from] std::string::FromUtf8Error),
}

/// Result alias for native commands.
pub type CommandResult<T> = Result<T, CommandError>;

/// Native generation capabilities used by the chat core.
///
/// Results are opaque strings: an image reference, an audio log whose
/// `/generated/` line names the asset, or base64 PNG pages.
pub trait CommandExecutor: Send + Sync {
    /// Generate an image for a prompt.
    fn generate_image(&self, prompt: &str) -> CommandFuture<'_, CommandResult<String>>;

    /// Synthesize speech.
    fn generate_audio(
        &self,
        text: &str,
        speaker: &str,
        language: &str,
    ) -> CommandFuture<'_, CommandResult<String>>;

    /// Rasterize a PDF document into base64 PNG pages, in page order.
    fn pdf_to_images(&self, pdf: &[u8]) -> CommandFuture<'_, CommandResult<Vec<String>>>;
}
