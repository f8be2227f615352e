//! In-memory store of authorized users and the channels each owns.
//!
//! Shared by the message pipeline and the admin service. Every operation
//! takes the same lock for its whole duration and hands out clones, so a
//! caller that needs fresh state must look it up again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::core::models::{Channel, RefreshedTokens, User, normalize_channel_name};
use crate::errors::BotError;
use crate::twitch::ChatClient;

#[derive(Default)]
struct RegistryState {
    users: HashMap<String, User>,
    channels: HashMap<String, HashMap<String, Channel>>,
}

impl RegistryState {
    fn is_channel_owned(&self, name: &str) -> bool {
        self.channels.values().any(|owned| owned.contains_key(name))
    }
}

pub struct Registry {
    state: Mutex<RegistryState>,
    chat: Arc<dyn ChatClient>,
}

impl Registry {
    #[must_use]
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            chat,
        }
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a user. A username that is already present keeps its
    /// existing entry.
    pub fn add_user(&self, user: User) {
        let mut state = self.state();
        if state.users.contains_key(&user.username) {
            debug!(username = %user.username, "user already registered");
            return;
        }
        info!(username = %user.username, "user registered");
        state.users.insert(user.username.clone(), user);
    }

    /// Removes the user and makes their channels unreachable. Channel names
    /// no other user owns are parted.
    pub fn remove_user(&self, user: &User) {
        let mut state = self.state();
        if state.users.remove(&user.username).is_none() {
            return;
        }
        let owned = state.channels.remove(&user.username).unwrap_or_default();
        for name in owned.keys() {
            if !state.is_channel_owned(name) {
                self.chat.part(name);
            }
        }
        info!(username = %user.username, channels = owned.len(), "user removed");
    }

    #[must_use]
    pub fn find_user(&self, username: &str) -> Option<User> {
        self.state().users.get(username).cloned()
    }

    #[must_use]
    pub fn find_user_by_id(&self, id: &str) -> Option<User> {
        self.state().users.values().find(|u| u.id == id).cloned()
    }

    /// Writes refreshed credentials into the registered user and returns the
    /// updated record, or `None` if the user is no longer registered.
    pub fn update_credentials(&self, username: &str, tokens: &RefreshedTokens) -> Option<User> {
        let mut state = self.state();
        let user = state.users.get_mut(username)?;
        user.apply_tokens(tokens);
        Some(user.clone())
    }

    /// Adds a channel under its owner and joins it on the chat network.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::NotFound`] if the owner is not registered.
    pub fn add_channel(&self, user: &User, channel: Channel) -> Result<(), BotError> {
        let mut state = self.state();
        if !state.users.contains_key(&user.username) {
            return Err(BotError::NotFound(format!("user {}", user.username)));
        }
        let name = normalize_channel_name(&channel.name);
        state
            .channels
            .entry(user.username.clone())
            .or_default()
            .insert(name.clone(), channel);
        self.chat.join(std::slice::from_ref(&name));
        info!(username = %user.username, channel = %name, "channel added");
        Ok(())
    }

    /// Removes a channel from its owner. The chat network channel is parted
    /// unless another user still owns one with the same name.
    pub fn remove_channel(&self, user: &User, channel: &Channel) {
        let mut state = self.state();
        let name = normalize_channel_name(&channel.name);
        let removed = state
            .channels
            .get_mut(&user.username)
            .and_then(|owned| owned.remove(&name));
        if removed.is_none() {
            return;
        }
        if !state.is_channel_owned(&name) {
            self.chat.part(&name);
        }
        info!(username = %user.username, channel = %name, "channel removed");
    }

    #[must_use]
    pub fn find_channel(&self, user: &User, channel_name: &str) -> Option<Channel> {
        self.state()
            .channels
            .get(&user.username)?
            .get(&normalize_channel_name(channel_name))
            .cloned()
    }

    #[must_use]
    pub fn channels_of(&self, user: &User) -> Vec<Channel> {
        self.state()
            .channels
            .get(&user.username)
            .map(|owned| owned.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every channel name currently owned by some user, sorted.
    #[must_use]
    pub fn channel_names(&self) -> Vec<String> {
        let state = self.state();
        let mut names: Vec<String> = state
            .channels
            .values()
            .flat_map(|owned| owned.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
