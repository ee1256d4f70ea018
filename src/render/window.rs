//! Windowed view over a conversation's message history.
//!
//! The view mounts a suffix of the history, grows it backward in pages when
//! the top sentinel comes into view, and follows new messages while the
//! viewport sits at the bottom. It never touches the history itself: callers
//! pass the current length (or the slice) on every pass.
//!
//! Timing is driven by explicit `Instant`s so the host event loop decides
//! what "now" is.

use std::ops::Range;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::trace;

use crate::conversations::types::Message;
use crate::core::ids::ConversationId;

/// Messages mounted when a conversation is opened.
pub const INITIAL_WINDOW: usize = 50;
/// Messages added per load-older step.
pub const PAGE_SIZE: usize = 25;
/// Distance from the bottom, in pixels, still counted as "at the bottom".
pub const BOTTOM_THRESHOLD_PX: f64 = 50.0;
/// Delay before an older page is mounted.
pub const LOAD_DELAY: Duration = Duration::from_millis(100);
/// Window during which scroll events are attributed to our own auto-scroll.
pub const AUTO_SCROLL_COOLDOWN: Duration = Duration::from_millis(500);

/// Scroll metrics of the scrollable region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollMetrics {
    /// Current offset from the top.
    pub scroll_top: f64,
    /// Total content height.
    pub scroll_height: f64,
    /// Visible height.
    pub client_height: f64,
}

impl ScrollMetrics {
    /// Whether the viewport is within [`BOTTOM_THRESHOLD_PX`] of the bottom.
    #[must_use]
    pub fn is_at_bottom(&self) -> bool {
        self.scroll_height - self.scroll_top - self.client_height < BOTTOM_THRESHOLD_PX
    }
}

/// Scroll request emitted to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScrollCommand {
    /// Scroll the bottom sentinel into view.
    ScrollToBottom {
        /// Animate the scroll.
        smooth: bool,
    },
}

fn initial_start(len: usize) -> usize {
    len.saturating_sub(INITIAL_WINDOW)
}

/// Per-view window state.
#[derive(Clone, Debug)]
pub struct MessageWindow {
    conversation: Option<ConversationId>,
    known_len: usize,
    visible_start: usize,
    is_loading_more: bool,
    is_pinned_to_bottom: bool,
    auto_scroll_until: Option<Instant>,
}

impl MessageWindow {
    /// Open a view on a conversation holding `len` messages.
    #[must_use]
    pub fn new(conversation: Option<ConversationId>, len: usize) -> Self {
        Self {
            conversation,
            known_len: len,
            visible_start: initial_start(len),
            is_loading_more: false,
            is_pinned_to_bottom: true,
            auto_scroll_until: None,
        }
    }

    /// Index of the first mounted message.
    #[must_use]
    pub const fn visible_start(&self) -> usize {
        self.visible_start
    }

    /// Whether a load-older step is pending.
    #[must_use]
    pub const fn is_loading_more(&self) -> bool {
        self.is_loading_more
    }

    /// Whether the view follows new messages.
    #[must_use]
    pub const fn is_pinned_to_bottom(&self) -> bool {
        self.is_pinned_to_bottom
    }

    /// Conversation the view is showing.
    #[must_use]
    pub const fn conversation(&self) -> Option<ConversationId> {
        self.conversation
    }

    /// Whether older messages remain unmounted.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.visible_start > 0
    }

    /// Count shown on the manual "Load N earlier messages" control.
    #[must_use]
    pub fn load_more_count(&self) -> usize {
        PAGE_SIZE.min(self.visible_start)
    }

    /// Mounted index range for the last known length.
    #[must_use]
    pub fn visible_range(&self) -> Range<usize> {
        self.visible_start.min(self.known_len)..self.known_len
    }

    /// Mounted messages of `messages`.
    #[must_use]
    pub fn visible<'a>(&self, messages: &'a [Message]) -> &'a [Message] {
        let start = self.visible_start.min(messages.len());
        &messages[start..]
    }

    fn auto_scrolling(&self, now: Instant) -> bool {
        self.auto_scroll_until.is_some_and(|until| now < until)
    }

    fn start_auto_scroll(&mut self, now: Instant) -> ScrollCommand {
        self.auto_scroll_until = Some(now + AUTO_SCROLL_COOLDOWN);
        ScrollCommand::ScrollToBottom { smooth: true }
    }

    /// Reconcile the view with the store after a render pass.
    ///
    /// A different conversation resets the window. A longer history while
    /// pinned to the bottom yields a scroll command.
    pub fn sync(
        &mut self,
        conversation: Option<ConversationId>,
        len: usize,
        now: Instant,
    ) -> Option<ScrollCommand> {
        if conversation != self.conversation {
            trace!(?conversation, len, "conversation switched, resetting window");
            *self = Self::new(conversation, len);
            return Some(self.start_auto_scroll(now));
        }

        let grew = len > self.known_len;
        self.known_len = len;
        if self.visible_start > len {
            self.visible_start = initial_start(len);
        }

        if grew && self.is_pinned_to_bottom {
            return Some(self.start_auto_scroll(now));
        }
        None
    }

    /// Record a scroll event from the host.
    ///
    /// Ignored while our own smooth scroll is in flight.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics, now: Instant) {
        if self.auto_scrolling(now) {
            return;
        }
        self.is_pinned_to_bottom = metrics.is_at_bottom();
    }

    /// Start a load-older step.
    ///
    /// Returns `false` when one is already pending or nothing is left.
    pub fn begin_load_older(&mut self) -> bool {
        if self.is_loading_more || self.visible_start == 0 {
            return false;
        }
        self.is_loading_more = true;
        true
    }

    /// Mount the next older page and clear the pending flag.
    pub fn finish_load_older(&mut self) {
        if !self.is_loading_more {
            return;
        }
        self.visible_start = self.visible_start.saturating_sub(PAGE_SIZE);
        self.is_loading_more = false;
        trace!(visible_start = self.visible_start, "mounted older page");
    }

    /// The top sentinel became visible.
    ///
    /// Returns whether a load-older step started. Visibility caused by our
    /// own auto-scroll does not count. This only starts the step: a host
    /// driving its own timers must call [`Self::finish_load_older`] after
    /// [`LOAD_DELAY`], otherwise later loads stay blocked. Hosts without a
    /// timer use [`Self::on_top_sentinel`].
    pub fn top_sentinel_visible(&mut self, now: Instant) -> bool {
        if self.auto_scrolling(now) {
            return false;
        }
        self.begin_load_older()
    }

    /// Sentinel-triggered load: start, wait [`LOAD_DELAY`], mount.
    ///
    /// Returns whether a page was mounted.
    pub async fn on_top_sentinel(&mut self, now: Instant) -> bool {
        if !self.top_sentinel_visible(now) {
            return false;
        }
        self.complete_after_delay().await;
        true
    }

    /// Manual "load older" control: start, wait [`LOAD_DELAY`], mount.
    ///
    /// Returns whether a page was mounted.
    pub async fn load_older(&mut self) -> bool {
        if !self.begin_load_older() {
            return false;
        }
        self.complete_after_delay().await;
        true
    }

    async fn complete_after_delay(&mut self) {
        tokio::time::sleep(LOAD_DELAY).await;
        self.finish_load_older();
    }
}

impl Default for MessageWindow {
    fn default() -> Self {
        Self::new(None, 0)
    }
}
