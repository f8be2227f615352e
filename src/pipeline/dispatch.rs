//! The pipeline's control point: authorize, answer, reply.
//!
//! Messages are handled strictly one at a time. Message N+1 is not pulled
//! until every step of message N has finished, which keeps replies in order
//! and throttles traffic to the slowest downstream call.

use futures::{Stream, StreamExt};
use std::pin::pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::send::ReplySender;
use crate::ai::CompletionEngine;
use crate::core::models::Message;
use crate::registry::Registry;

/// What happened to one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Replied,
    UnknownSender,
    UnknownChannel,
    CompletionFailed,
    SendFailed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub received: u64,
    pub unknown_sender: u64,
    pub unknown_channel: u64,
    pub completion_failures: u64,
    pub send_failures: u64,
    pub replies_sent: u64,
}

impl DispatchStats {
    fn record(&mut self, outcome: Outcome) {
        self.received += 1;
        match outcome {
            Outcome::Replied => self.replies_sent += 1,
            Outcome::UnknownSender => self.unknown_sender += 1,
            Outcome::UnknownChannel => self.unknown_channel += 1,
            Outcome::CompletionFailed => self.completion_failures += 1,
            Outcome::SendFailed => self.send_failures += 1,
        }
    }
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    engine: Arc<dyn CompletionEngine>,
    sender: Arc<dyn ReplySender>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        engine: Arc<dyn CompletionEngine>,
        sender: Arc<dyn ReplySender>,
    ) -> Self {
        Self {
            registry,
            engine,
            sender,
        }
    }

    /// Runs one message through lookup, completion, and send.
    pub async fn handle(&self, message: &Message) -> Outcome {
        let Some(user) = self.registry.find_user(&message.sender_username) else {
            debug!(username = %message.sender_username, "ignoring message from unregistered sender");
            return Outcome::UnknownSender;
        };
        let Some(channel) = self.registry.find_channel(&user, &message.channel_name) else {
            debug!(
                username = %user.username,
                channel = %message.channel_name,
                "ignoring message on a channel the sender does not own"
            );
            return Outcome::UnknownChannel;
        };

        let query = message.query().unwrap_or(&message.text);
        let answer = match self.engine.complete(query).await {
            Ok(answer) => answer,
            Err(e) => {
                error!(username = %user.username, channel = %channel.name, error = %e, "completion failed");
                return Outcome::CompletionFailed;
            }
        };

        match self.sender.send(&user, &channel, &answer).await {
            Ok(()) => {
                info!(username = %user.username, channel = %channel.name, "reply sent");
                Outcome::Replied
            }
            Err(e) => {
                error!(username = %user.username, channel = %channel.name, error = %e, "failed to send reply");
                Outcome::SendFailed
            }
        }
    }

    /// Consumes `messages` until it ends or `cancel` fires. A message that is
    /// already being handled runs to completion.
    pub async fn run<S>(&self, messages: S, cancel: CancellationToken) -> DispatchStats
    where
        S: Stream<Item = Message>,
    {
        let mut messages = pin!(messages);
        let mut stats = DispatchStats::default();

        loop {
            let message = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = messages.next() => match next {
                    Some(message) => message,
                    None => break,
                },
            };
            stats.record(self.handle(&message).await);
        }

        info!(
            received = stats.received,
            replies_sent = stats.replies_sent,
            completion_failures = stats.completion_failures,
            send_failures = stats.send_failures,
            "dispatch stopped"
        );
        stats
    }
}
