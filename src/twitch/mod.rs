//! All Twitch-specific functionality

pub mod api;
pub mod irc;

// Re-export main types for convenience
pub use api::{ChatApi, TwitchApi, TwitchUser};
pub use irc::{ChatClient, IrcClient, MessageCallback};
