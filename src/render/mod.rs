//! View-side logic: message windowing and content decomposition.

pub mod audio;
pub mod clipboard;
pub mod segments;
pub mod window;

pub use audio::{GENERATED_PREFIX, extract_audio_source};
#[cfg(feature = "clipboard")]
pub use clipboard::SystemClipboard;
pub use clipboard::{COPIED_INDICATION, Clipboard, ClipboardError, CopyFeedback};
pub use segments::{Segment, split_segments};
pub use window::{
    AUTO_SCROLL_COOLDOWN, BOTTOM_THRESHOLD_PX, INITIAL_WINDOW, LOAD_DELAY, MessageWindow,
    PAGE_SIZE, ScrollCommand, ScrollMetrics,
};
