use crate::core::GenerationStatus;
use tokio::sync::mpsc;

/// Characters of generated text carried in a notification preview.
pub const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub status: GenerationStatus,
    pub content_preview: String,
}

impl Notification {
    pub fn new(status: GenerationStatus, content: &str) -> Self {
        Self {
            status,
            content_preview: preview(content),
        }
    }
}

/// First [`PREVIEW_CHARS`] characters of `content`, with an ellipsis when cut.
pub fn preview(content: &str) -> String {
    let mut chars = content.char_indices();
    match chars.nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}…", &content[..cut]),
        None => content.to_string(),
    }
}

/// Presentation-only progress reporting. Implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the tracing log.
#[derive(Debug, Default)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn notify(&self, notification: Notification) {
        tracing::debug!(
            status = %notification.status,
            preview = %notification.content_preview,
            "generation progress"
        );
    }
}

/// Forwards notifications to a bounded channel, dropping them when it is full.
#[derive(Debug, Clone)]
pub struct ChannelNotificationSink {
    tx: mpsc::Sender<Notification>,
}

impl ChannelNotificationSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelNotificationSink {
    fn notify(&self, notification: Notification) {
        if let Err(error) = self.tx.try_send(notification) {
            tracing::debug!("notification dropped: {error}");
        }
    }
}

#[derive(Debug, Default)]
pub struct NullNotificationSink;

impl NotificationSink for NullNotificationSink {
    fn notify(&self, _notification: Notification) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_is_not_truncated() {
        assert_eq!(preview("hello"), "hello");
        assert_eq!(preview(&"a".repeat(PREVIEW_CHARS)), "a".repeat(PREVIEW_CHARS));
    }

    #[test]
    fn long_content_is_cut_on_a_char_boundary() {
        let content = "é".repeat(PREVIEW_CHARS + 20);
        let cut = preview(&content);
        assert_eq!(cut.chars().count(), PREVIEW_CHARS + 1);
        assert!(cut.ends_with('…'));
    }

    #[tokio::test]
    async fn channel_sink_delivers_and_drops_when_full() {
        let (sink, mut rx) = ChannelNotificationSink::new(1);
        sink.notify(Notification::new(GenerationStatus::Thinking, ""));
        sink.notify(Notification::new(GenerationStatus::Streaming, "dropped"));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.status, GenerationStatus::Thinking);
        assert!(rx.try_recv().is_err());
    }
}
