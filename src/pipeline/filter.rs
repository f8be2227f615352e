use futures::{Stream, StreamExt, future};
use tokio_util::sync::CancellationToken;

use crate::core::models::{Message, MessageType, TRIGGER_PREFIX};

/// True when the message is of an allowed kind and addressed to the bot.
#[must_use]
pub fn is_command(message: &Message, allowed_types: &[MessageType]) -> bool {
    allowed_types.contains(&message.message_type) && message.text.starts_with(TRIGGER_PREFIX)
}

/// Lazily keeps the messages that pass [`is_command`], in source order.
/// Everything else is dropped silently. The stream ends with the source or
/// when `cancel` fires.
pub fn filter_messages<S>(
    source: S,
    allowed_types: Vec<MessageType>,
    cancel: CancellationToken,
) -> impl Stream<Item = Message>
where
    S: Stream<Item = Message>,
{
    source
        .take_until(cancel.cancelled_owned())
        .filter(move |message| future::ready(is_command(message, &allowed_types)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures::stream;

    fn message(text: &str, message_type: MessageType) -> Message {
        Message {
            sender_username: "alice".to_string(),
            channel_name: "bobschannel".to_string(),
            text: text.to_string(),
            message_type,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_is_command_needs_type_and_prefix() {
        let allowed = [MessageType::PrivMsg];
        assert!(is_command(&message("!!!hi", MessageType::PrivMsg), &allowed));
        assert!(!is_command(&message("hi", MessageType::PrivMsg), &allowed));
        assert!(!is_command(&message(" !!!hi", MessageType::PrivMsg), &allowed));
        assert!(!is_command(&message("!!!hi", MessageType::Join), &allowed));
        assert!(!is_command(&message("!!!hi", MessageType::Whisper), &[]));
    }

    #[tokio::test]
    async fn test_filter_preserves_order_and_drops_the_rest() {
        let source = stream::iter(vec![
            message("!!!first", MessageType::PrivMsg),
            message("chatter", MessageType::PrivMsg),
            message("!!!joined", MessageType::Join),
            message("!!!second", MessageType::PrivMsg),
            message("!!!whisper", MessageType::Whisper),
            message("!!!third", MessageType::PrivMsg),
        ]);

        let texts: Vec<String> =
            filter_messages(source, vec![MessageType::PrivMsg], CancellationToken::new())
                .map(|m| m.text)
                .collect()
                .await;

        assert_eq!(texts, vec!["!!!first", "!!!second", "!!!third"]);
    }

    #[tokio::test]
    async fn test_filter_is_lazy() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let source = stream::iter(0..100).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            message(&format!("!!!{i}"), MessageType::PrivMsg)
        });

        let filtered = filter_messages(source, vec![MessageType::PrivMsg], CancellationToken::new());
        let first_two: Vec<Message> = filtered.take(2).collect().await;

        assert_eq!(first_two.len(), 2);
        assert_eq!(pulled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_filter_ends_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let source = stream::pending::<Message>();

        let collected: Vec<Message> =
            filter_messages(source, vec![MessageType::PrivMsg], cancel).collect().await;

        assert!(collected.is_empty());
    }
}
