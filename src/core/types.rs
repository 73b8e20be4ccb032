use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// An image attached to a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ImageRef {
    /// Path on the local filesystem, read at request-build time.
    File(PathBuf),
    /// Base64 payload, optionally carrying a `data:<mime>;base64,` prefix.
    Inline(String),
}

/// Synthetic system messages recognized by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageMarker {
    Cancelled,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    pub reasoning_text: Option<String>,
    pub quoted_text: Option<String>,
    pub model_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Set on an assistant placeholder while its generation is in flight.
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub search_results: Vec<SearchResult>,
    pub ocr_text: Option<String>,
    pub marker: Option<MessageMarker>,
}

impl Message {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            images: Vec::new(),
            reasoning_text: None,
            quoted_text: None,
            model_name: None,
            timestamp: Utc::now(),
            pending: false,
            search_results: Vec::new(),
            ocr_text: None,
            marker: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// Empty assistant turn that anchors crash recovery for a generation.
    pub fn assistant_placeholder(model_name: &str) -> Self {
        Self {
            model_name: Some(model_name.to_string()),
            pending: true,
            ..Self::new(Role::Assistant, String::new())
        }
    }

    pub fn sentinel(marker: MessageMarker, text: impl Into<String>) -> Self {
        Self {
            marker: Some(marker),
            ..Self::new(Role::System, text)
        }
    }

    #[must_use]
    pub fn with_images(mut self, images: Vec<ImageRef>) -> Self {
        self.images = images;
        self
    }

    #[must_use]
    pub fn with_quote(mut self, quoted: impl Into<String>) -> Self {
        self.quoted_text = Some(quoted.into());
        self
    }

    pub fn is_sentinel(&self) -> bool {
        self.marker.is_some()
    }

    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: Option<u64>,
}

/// One decoded unit of a completion stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaEvent {
    pub visible_text: String,
    pub reasoning_text: String,
    pub usage: Option<TokenUsage>,
    pub is_terminal: bool,
}

impl DeltaEvent {
    pub fn text(visible_text: impl Into<String>, reasoning_text: impl Into<String>) -> Self {
        Self {
            visible_text: visible_text.into(),
            reasoning_text: reasoning_text.into(),
            ..Self::default()
        }
    }

    pub fn terminal() -> Self {
        Self {
            is_terminal: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.usage = usage;
        self
    }

    /// True when the event carries nothing worth forwarding.
    pub fn is_empty(&self) -> bool {
        self.visible_text.is_empty()
            && self.reasoning_text.is_empty()
            && self.usage.is_none()
            && !self.is_terminal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationStatus {
    Thinking,
    Searching,
    Generating,
    Streaming,
    Completed,
}
