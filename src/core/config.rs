use std::env;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com";
const DEFAULT_TWITCH_API_BASE: &str = "https://api.twitch.tv";
const DEFAULT_TWITCH_AUTH_BASE: &str = "https://id.twitch.tv";
const DEFAULT_IRC_ADDRESS: &str = "irc.chat.twitch.tv:6667";
const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub debug: bool,
    pub sqlite_db_path: String,
    pub twitch_client_id: String,
    pub twitch_client_secret: String,
    pub twitch_api_base: String,
    pub twitch_auth_base: String,
    pub twitch_irc_address: String,
    pub openai_api_key: String,
    pub openai_api_base: String,
    pub chatgpt_model: String,
    pub chatgpt_system_message: String,
    pub message_queue_capacity: usize,
}

impl AppConfig {
    /// # Errors
    ///
    /// Returns the name of the first required variable that is missing, or of
    /// an optional variable that does not parse.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary lookup, so tests need not touch the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Same as [`AppConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name).ok_or_else(|| format!("{name}: environment variable not found"))
        };
        let optional = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let message_queue_capacity = match lookup("MESSAGE_QUEUE_CAPACITY") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(0) => return Err("MESSAGE_QUEUE_CAPACITY: must be greater than zero".to_string()),
                Ok(n) => n,
                Err(e) => return Err(format!("MESSAGE_QUEUE_CAPACITY: {e}")),
            },
            None => DEFAULT_QUEUE_CAPACITY,
        };

        Ok(Self {
            debug: lookup("DEBUG").is_some(),
            sqlite_db_path: required("SQLITE_DB_PATH")?,
            twitch_client_id: required("OAUTH2_CLIENT_ID")?,
            twitch_client_secret: required("OAUTH2_CLIENT_SECRET")?,
            twitch_api_base: optional("TWITCH_API_BASE", DEFAULT_TWITCH_API_BASE),
            twitch_auth_base: optional("TWITCH_AUTH_BASE", DEFAULT_TWITCH_AUTH_BASE),
            twitch_irc_address: optional("TWITCH_IRC_ADDRESS", DEFAULT_IRC_ADDRESS),
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_api_base: optional("OPENAI_API_BASE", DEFAULT_OPENAI_API_BASE),
            chatgpt_model: optional("CHAT_GPT_MODEL", DEFAULT_MODEL),
            chatgpt_system_message: required("CHAT_GPT_SYSTEM_MESSAGE")?,
            message_queue_capacity,
        })
    }
}
