use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Marks a chat message as a question for the bot.
pub const TRIGGER_PREFIX: &str = "!!!";

/// Kind of event delivered by the chat network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Unset,
    Whisper,
    PrivMsg,
    ClearChat,
    RoomState,
    UserNotice,
    UserState,
    Notice,
    Join,
    Part,
    Reconnect,
    Names,
    Ping,
    Pong,
    ClearMsg,
    GlobalUserState,
}

impl MessageType {
    /// Maps an IRC command to its event kind. Unknown commands map to `Unset`.
    #[must_use]
    pub fn from_command(command: &str) -> Self {
        match command {
            "PRIVMSG" => Self::PrivMsg,
            "WHISPER" => Self::Whisper,
            "CLEARCHAT" => Self::ClearChat,
            "ROOMSTATE" => Self::RoomState,
            "USERNOTICE" => Self::UserNotice,
            "USERSTATE" => Self::UserState,
            "NOTICE" => Self::Notice,
            "JOIN" => Self::Join,
            "PART" => Self::Part,
            "RECONNECT" => Self::Reconnect,
            "353" => Self::Names,
            "PING" => Self::Ping,
            "PONG" => Self::Pong,
            "CLEARMSG" => Self::ClearMsg,
            "GLOBALUSERSTATE" => Self::GlobalUserState,
            _ => Self::Unset,
        }
    }
}

/// One inbound chat event in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender_username: String,
    pub channel_name: String,
    pub text: String,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// The message text without the trigger prefix, or `None` when the text
    /// is not addressed to the bot.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.text.strip_prefix(TRIGGER_PREFIX)
    }
}

/// An authorized broadcaster together with the credentials used to reply on
/// their behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Twitch user id, sent as `sender_id` when replying.
    pub id: String,
    pub username: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expiry: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Overwrites the credential fields with a freshly refreshed token set.
    pub fn apply_tokens(&mut self, tokens: &RefreshedTokens) {
        self.access_token.clone_from(&tokens.access_token);
        self.refresh_token.clone_from(&tokens.refresh_token);
        self.token_expiry = Utc::now() + Duration::seconds(tokens.expires_in);
    }
}

/// A chat channel a user allows the bot to answer in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub owner_user_id: String,
    /// Twitch id of the broadcaster whose chat this is.
    pub broadcaster_id: String,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    #[must_use]
    pub fn new(owner: &User, name: &str, broadcaster_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: normalize_channel_name(name),
            owner_user_id: owner.id.clone(),
            broadcaster_id: broadcaster_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Response of a successful refresh-token exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Lower-cases a channel name and strips a leading `#`.
#[must_use]
pub fn normalize_channel_name(name: &str) -> String {
    name.trim().trim_start_matches('#').to_ascii_lowercase()
}
