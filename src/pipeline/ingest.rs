//! Bridges the chat client's callback into an ordered, cancellable stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::models::Message;
use crate::errors::BotError;
use crate::twitch::ChatClient;

pub struct IngestHandle {
    /// Ends when the connection closes or the token is cancelled.
    pub messages: ReceiverStream<Message>,
    /// Resolves with the connection's result; an error is fatal.
    pub connection: JoinHandle<Result<(), BotError>>,
    /// Messages discarded because the queue was full.
    pub dropped: Arc<AtomicU64>,
}

/// Registers a callback on `client`, connects it on a background task, and
/// returns the resulting message stream.
///
/// The callback never blocks: when the queue already holds `capacity`
/// messages the newest one is dropped and counted.
#[must_use]
pub fn open(client: Arc<dyn ChatClient>, cancel: CancellationToken, capacity: usize) -> IngestHandle {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));

    let callback_cancel = cancel.clone();
    let callback_dropped = Arc::clone(&dropped);
    client.on_message(Arc::new(move |message: Message| {
        if callback_cancel.is_cancelled() {
            return;
        }
        match tx.try_send(message) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(message)) => {
                let total = callback_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    channel = %message.channel_name,
                    dropped_total = total,
                    "message queue full, dropping newest message"
                );
            }
        }
    }));

    let connection = tokio::spawn(async move {
        let result = tokio::select! {
            result = client.connect() => result,
            () = cancel.cancelled() => {
                info!("ingestion cancelled");
                Ok(())
            }
        };
        // Dropping the callback drops the last sender and ends the stream.
        client.clear_callback();
        result
    });

    IngestHandle {
        messages: ReceiverStream::new(rx),
        connection,
        dropped,
    }
}
