//! Splitting message content into text and fenced code segments.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Triple-backtick fence marker.
pub const FENCE: &str = "```";

/// Opening fence, optional language tag line, lazy body, closing fence.
const FENCE_PATTERN: &str = r"```(?:(\w*)\n)?([\s\S]*?)```";

/// One renderable piece of a message.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    /// Free-form text.
    Text {
        /// Trimmed text.
        value: String,
    },
    /// Fenced code block.
    Code {
        /// Trimmed code body.
        value: String,
        /// Language tag following the opening fence, if any.
        language: Option<String>,
    },
}

impl Segment {
    /// Build a text segment.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    /// Build a code segment without language tag.
    #[must_use]
    pub fn code(value: impl Into<String>) -> Self {
        Self::Code {
            value: value.into(),
            language: None,
        }
    }

    /// Payload, which is also what the copy button copies.
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Text { value } | Self::Code { value, .. } => value,
        }
    }

    /// Whether this is a code segment.
    #[must_use]
    pub const fn is_code(&self) -> bool {
        matches!(self, Self::Code { .. })
    }
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE_RE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE_RE.get_or_init(|| Regex::new(FENCE_PATTERN).ok()).as_ref()
}

fn push_text(segments: &mut Vec<Segment>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        segments.push(Segment::text(trimmed));
    }
}

/// Split content into ordered text and code segments.
///
/// Empty pieces are dropped. Content with an unbalanced number of fence
/// markers is returned untouched as a single text segment.
#[must_use]
pub fn split_segments(content: &str) -> Vec<Segment> {
    let fence_count = content.matches(FENCE).count();
    if fence_count % 2 == 1 {
        return vec![Segment::text(content)];
    }

    let Some(fence) = fence_regex() else {
        return vec![Segment::text(content)];
    };

    let mut segments = Vec::new();
    let mut cursor = 0;

    for caps in fence.captures_iter(content) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        push_text(&mut segments, &content[cursor..whole.start()]);

        let body = caps.get(2).map_or("", |m| m.as_str()).trim();
        if !body.is_empty() {
            let language = caps
                .get(1)
                .map(|m| m.as_str())
                .filter(|tag| !tag.is_empty())
                .map(ToString::to_string);
            segments.push(Segment::Code {
                value: body.to_string(),
                language,
            });
        }
        cursor = whole.end();
    }

    push_text(&mut segments, &content[cursor..]);
    segments
}
