//! Outbound replies with a single credential refresh on rejection.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::core::models::{Channel, User};
use crate::errors::BotError;
use crate::registry::Registry;
use crate::storage::Repository;
use crate::twitch::ChatApi;

/// Twitch rejects chat messages longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 500;

#[async_trait]
pub trait ReplySender: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the reply could not be delivered.
    async fn send(&self, user: &User, channel: &Channel, text: &str) -> Result<(), BotError>;
}

/// Cuts `text` to the chat length limit on a character boundary.
#[must_use]
pub fn truncate_for_chat(text: &str) -> &str {
    match text.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub struct Sender {
    api: Arc<dyn ChatApi>,
    registry: Arc<Registry>,
    repository: Arc<dyn Repository>,
}

impl Sender {
    #[must_use]
    pub fn new(
        api: Arc<dyn ChatApi>,
        registry: Arc<Registry>,
        repository: Arc<dyn Repository>,
    ) -> Self {
        Self {
            api,
            registry,
            repository,
        }
    }

    async fn attempt(
        &self,
        access_token: &str,
        user: &User,
        channel: &Channel,
        text: &str,
    ) -> Result<(), BotError> {
        self.api
            .send_message(access_token, &channel.broadcaster_id, &user.id, text)
            .await
            .map(|_| ())
    }

    /// Exchanges the refresh token and writes the result through the
    /// registry, then persists it. Returns the new access token.
    async fn refresh(&self, user: &User) -> Result<String, BotError> {
        let tokens = self.api.refresh_token(&user.refresh_token).await?;

        match self.registry.update_credentials(&user.username, &tokens) {
            Some(updated) => {
                if let Err(e) = self.repository.update_user(&updated).await {
                    error!(username = %user.username, error = %e, "failed to persist refreshed credentials");
                }
                info!(username = %user.username, expires_at = %updated.token_expiry, "access token refreshed");
            }
            None => warn!(username = %user.username, "user removed while refreshing credentials"),
        }

        Ok(tokens.access_token)
    }
}

#[async_trait]
impl ReplySender for Sender {
    async fn send(&self, user: &User, channel: &Channel, text: &str) -> Result<(), BotError> {
        let text = truncate_for_chat(text);

        match self.attempt(&user.access_token, user, channel, text).await {
            Err(e) if e.is_unauthorized() => {
                warn!(username = %user.username, "access token rejected, refreshing");
            }
            other => return other,
        }

        let access_token = self.refresh(user).await?;
        // A second rejection is final: no further refresh.
        self.attempt(&access_token, user, channel, text).await
    }
}
