//! Ingestion → filter → dispatch

pub mod dispatch;
pub mod filter;
pub mod ingest;
pub mod send;

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::models::MessageType;
use crate::errors::BotError;
use crate::registry::Registry;
use crate::storage::Repository;
use crate::twitch::ChatClient;

pub use dispatch::{DispatchStats, Dispatcher, Outcome};
pub use filter::{filter_messages, is_command};
pub use send::{ReplySender, Sender};

/// Event kinds the bot answers.
pub const ALLOWED_TYPES: [MessageType; 1] = [MessageType::PrivMsg];

/// Loads every stored user and their channels into the registry. Channel
/// joins are queued on the chat client until it connects.
///
/// # Errors
///
/// Returns an error if the repository cannot be read.
pub async fn seed_registry(repository: &dyn Repository, registry: &Registry) -> Result<(), BotError> {
    let users = repository.get_users().await?;
    let mut channel_count = 0;
    for user in users {
        let channels = repository.get_channels_by_user(&user.id).await?;
        registry.add_user(user.clone());
        for channel in channels {
            registry.add_channel(&user, channel)?;
            channel_count += 1;
        }
    }
    info!(channels = channel_count, "registry seeded");
    Ok(())
}

/// Handles to a running pipeline.
pub struct Pipeline {
    pub connection: JoinHandle<Result<(), BotError>>,
    pub dispatch: JoinHandle<DispatchStats>,
    pub dropped: Arc<AtomicU64>,
}

/// Starts ingestion on one task and filter + dispatch on another.
#[must_use]
pub fn start(
    chat: Arc<dyn ChatClient>,
    dispatcher: Dispatcher,
    queue_capacity: usize,
    cancel: &CancellationToken,
) -> Pipeline {
    let ingest = ingest::open(chat, cancel.clone(), queue_capacity);
    let commands = filter_messages(ingest.messages, ALLOWED_TYPES.to_vec(), cancel.clone());

    let dispatch_cancel = cancel.clone();
    let dispatch = tokio::spawn(async move { dispatcher.run(commands, dispatch_cancel).await });

    Pipeline {
        connection: ingest.connection,
        dispatch,
        dropped: ingest.dropped,
    }
}
