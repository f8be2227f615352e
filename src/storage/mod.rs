//! Durable storage for users and channels

pub mod sqlite;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::models::{Channel, User};
use crate::errors::BotError;

pub use sqlite::SqliteRepository;

/// Persistence consumed at startup, by the admin service, and by the send
/// stage after a credential refresh.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_users(&self) -> Result<Vec<User>, BotError>;
    async fn get_user(&self, id: &str) -> Result<Option<User>, BotError>;
    async fn save_user(&self, user: &User) -> Result<(), BotError>;
    /// # Errors
    ///
    /// Returns [`BotError::NotFound`] if no row has the user's id.
    async fn update_user(&self, user: &User) -> Result<(), BotError>;
    async fn delete_user(&self, id: &str) -> Result<(), BotError>;
    async fn get_channels_by_user(&self, user_id: &str) -> Result<Vec<Channel>, BotError>;
    async fn save_channel(&self, channel: &Channel) -> Result<(), BotError>;
    async fn get_channel(&self, id: Uuid) -> Result<Option<Channel>, BotError>;
    async fn delete_channel(&self, id: Uuid) -> Result<(), BotError>;
}
