//! Copy-to-clipboard with a transient "copied" indication.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::error;

/// How long the "copied" indication stays on.
pub const COPIED_INDICATION: Duration = Duration::from_secs(2);

/// Clipboard failure.
#[derive(Debug, Error)]
#[error("clipboard unavailable: {0}")]
pub struct ClipboardError(pub String);

/// Places text on a clipboard.
pub trait Clipboard {
    /// Replace the clipboard content with `text`.
    ///
    /// # Errors
    /// Returns an error if the clipboard cannot be accessed.
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError>;
}

/// Operating system clipboard.
#[cfg(feature = "clipboard")]
pub struct SystemClipboard {
    inner: arboard::Clipboard,
}

#[cfg(feature = "clipboard")]
impl SystemClipboard {
    /// Open the system clipboard.
    ///
    /// # Errors
    /// Returns an error if no clipboard is available.
    pub fn new() -> Result<Self, ClipboardError> {
        let inner = arboard::Clipboard::new().map_err(|e| ClipboardError(e.to_string()))?;
        Ok(Self { inner })
    }
}

#[cfg(feature = "clipboard")]
impl Clipboard for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        self.inner
            .set_text(text.to_string())
            .map_err(|e| ClipboardError(e.to_string()))
    }
}

/// Tracks the "copied" indication shared by the copy buttons of a view.
#[derive(Clone, Copy, Debug, Default)]
pub struct CopyFeedback {
    copied_until: Option<Instant>,
}

impl CopyFeedback {
    /// Create an idle tracker.
    #[must_use]
    pub const fn new() -> Self {
        Self { copied_until: None }
    }

    /// Copy `text` and start the indication on success.
    ///
    /// Failures are logged only. Returns whether the copy succeeded.
    pub fn copy<C: Clipboard + ?Sized>(&mut self, clipboard: &mut C, text: &str, now: Instant) -> bool {
        match clipboard.set_text(text) {
            Ok(()) => {
                self.copied_until = Some(now + COPIED_INDICATION);
                true
            }
            Err(err) => {
                error!("Failed to copy text: {err}");
                false
            }
        }
    }

    /// Whether the indication is showing at `now`.
    #[must_use]
    pub fn is_copied(&self, now: Instant) -> bool {
        self.copied_until.is_some_and(|until| now < until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MemoryClipboard {
        content: Option<String>,
        broken: bool,
    }

    impl Clipboard for MemoryClipboard {
        fn set_text(&mut self, text: &str) -> Result<(), ClipboardError> {
            if self.broken {
                return Err(ClipboardError("no display".to_string()));
            }
            self.content = Some(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_copy_sets_indication_for_two_seconds() {
        let mut clipboard = MemoryClipboard::default();
        let mut feedback = CopyFeedback::new();
        let now = Instant::now();

        assert!(!feedback.is_copied(now));
        assert!(feedback.copy(&mut clipboard, "code()", now));
        assert_eq!(clipboard.content.as_deref(), Some("code()"));
        assert!(feedback.is_copied(now + Duration::from_millis(1999)));
        assert!(!feedback.is_copied(now + COPIED_INDICATION));
    }

    #[test]
    fn test_copy_failure_is_silent() {
        let mut clipboard = MemoryClipboard {
            broken: true,
            ..MemoryClipboard::default()
        };
        let mut feedback = CopyFeedback::new();
        let now = Instant::now();
        assert!(!feedback.copy(&mut clipboard, "text", now));
        assert!(!feedback.is_copied(now));
    }
}
