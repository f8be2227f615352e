//! Bookkeeping behind the admin interface: every change is written to the
//! repository first and then mirrored into the registry.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::core::models::{Channel, User, normalize_channel_name};
use crate::errors::BotError;
use crate::registry::Registry;
use crate::storage::Repository;
use crate::twitch::ChatApi;

pub struct Admin {
    repository: Arc<dyn Repository>,
    registry: Arc<Registry>,
    api: Arc<dyn ChatApi>,
}

impl Admin {
    #[must_use]
    pub fn new(repository: Arc<dyn Repository>, registry: Arc<Registry>, api: Arc<dyn ChatApi>) -> Self {
        Self {
            repository,
            registry,
            api,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the user cannot be saved.
    pub async fn register_user(&self, user: User) -> Result<(), BotError> {
        self.repository.save_user(&user).await?;
        self.registry.add_user(user);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`BotError::NotFound`] for an unknown id, or a storage error.
    pub async fn remove_user(&self, user_id: &str) -> Result<(), BotError> {
        let user = self
            .repository
            .get_user(user_id)
            .await?
            .ok_or_else(|| BotError::NotFound(format!("user {user_id}")))?;
        self.repository.delete_user(&user.id).await?;
        self.registry.remove_user(&user);
        Ok(())
    }

    /// Resolves the broadcaster behind `channel_name` with the owner's token,
    /// stores the channel, and registers it (which joins it).
    ///
    /// # Errors
    ///
    /// Returns [`BotError::NotFound`] if the owner or the Twitch account does
    /// not exist, or any API or storage error.
    pub async fn add_channel(&self, user_id: &str, channel_name: &str) -> Result<Channel, BotError> {
        let name = normalize_channel_name(channel_name);
        if name.is_empty() {
            return Err(BotError::ParseError("channel name is empty".to_string()));
        }
        let owner = self
            .registry
            .find_user_by_id(user_id)
            .ok_or_else(|| BotError::NotFound(format!("user {user_id}")))?;

        let broadcaster = self.api.get_user(&owner.access_token, &name).await?;
        let channel = Channel::new(&owner, &name, &broadcaster.id);
        self.repository.save_channel(&channel).await?;
        self.registry.add_channel(&owner, channel.clone())?;
        info!(username = %owner.username, channel = %channel.name, broadcaster_id = %channel.broadcaster_id, "channel stored");
        Ok(channel)
    }

    /// # Errors
    ///
    /// Returns [`BotError::NotFound`] for an unknown id, or a storage error.
    pub async fn remove_channel(&self, channel_id: Uuid) -> Result<(), BotError> {
        let channel = self
            .repository
            .get_channel(channel_id)
            .await?
            .ok_or_else(|| BotError::NotFound(format!("channel {channel_id}")))?;
        self.repository.delete_channel(channel.id).await?;
        if let Some(owner) = self.registry.find_user_by_id(&channel.owner_user_id) {
            self.registry.remove_channel(&owner, &channel);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::RefreshedTokens;
    use crate::registry::tests::{RecordingChat, user};
    use crate::storage::SqliteRepository;
    use crate::twitch::TwitchUser;
    use crate::twitch::api::SentMessage;
    use async_trait::async_trait;

    struct LookupApi;

    #[async_trait]
    impl ChatApi for LookupApi {
        async fn send_message(&self, _: &str, _: &str, _: &str, _: &str) -> Result<SentMessage, BotError> {
            Err(BotError::GeneralError("not used".to_string()))
        }

        async fn refresh_token(&self, _: &str) -> Result<RefreshedTokens, BotError> {
            Err(BotError::GeneralError("not used".to_string()))
        }

        async fn get_user(&self, _access_token: &str, login: &str) -> Result<TwitchUser, BotError> {
            if login == "bobschannel" {
                Ok(TwitchUser {
                    id: "42".to_string(),
                    login: login.to_string(),
                    display_name: "BobsChannel".to_string(),
                })
            } else {
                Err(BotError::NotFound(login.to_string()))
            }
        }
    }

    fn admin() -> (Admin, Arc<Registry>, Arc<SqliteRepository>, Arc<RecordingChat>) {
        let chat = Arc::new(RecordingChat::default());
        let registry = Arc::new(Registry::new(chat.clone()));
        let repository = Arc::new(SqliteRepository::open_in_memory().unwrap());
        let admin = Admin::new(repository.clone(), Arc::clone(&registry), Arc::new(LookupApi));
        (admin, registry, repository, chat)
    }

    #[tokio::test]
    async fn test_channel_lifecycle() {
        let (admin, registry, repository, chat) = admin();
        let alice = user("1", "alice");
        admin.register_user(alice.clone()).await.unwrap();

        let channel = admin.add_channel("1", "#BobsChannel").await.unwrap();

        assert_eq!(channel.broadcaster_id, "42");
        assert_eq!(channel.name, "bobschannel");
        assert_eq!(registry.find_channel(&alice, "bobschannel"), Some(channel.clone()));
        assert_eq!(repository.get_channel(channel.id).await.unwrap(), Some(channel.clone()));

        admin.remove_channel(channel.id).await.unwrap();

        assert_eq!(registry.find_channel(&alice, "bobschannel"), None);
        assert_eq!(repository.get_channel(channel.id).await.unwrap(), None);
        assert_eq!(chat.calls(), vec!["join bobschannel", "part bobschannel"]);
    }

    #[tokio::test]
    async fn test_add_channel_unknown_broadcaster_stores_nothing() {
        let (admin, registry, repository, _) = admin();
        let alice = user("1", "alice");
        admin.register_user(alice.clone()).await.unwrap();

        let err = admin.add_channel("1", "nobody").await.unwrap_err();

        assert!(matches!(err, BotError::NotFound(_)));
        assert!(repository.get_channels_by_user("1").await.unwrap().is_empty());
        assert!(registry.channels_of(&alice).is_empty());
    }

    #[tokio::test]
    async fn test_remove_user() {
        let (admin, registry, repository, _) = admin();
        admin.register_user(user("1", "alice")).await.unwrap();
        let channel = admin.add_channel("1", "bobschannel").await.unwrap();

        admin.remove_user("1").await.unwrap();

        assert_eq!(registry.find_user("alice"), None);
        assert_eq!(repository.get_user("1").await.unwrap(), None);
        // Channel rows outlive their owner.
        assert!(repository.get_channel(channel.id).await.unwrap().is_some());
        assert!(matches!(admin.remove_user("1").await, Err(BotError::NotFound(_))));
    }
}
