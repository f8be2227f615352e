use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Failed to parse chat event: {0}")]
    ParseError(String),

    #[error("Failed to access Twitch API: {0}")]
    ApiError(String),

    #[error("Twitch rejected the credentials: {0}")]
    Unauthorized(String),

    #[error("Failed to access OpenAI API: {0}")]
    OpenAIError(String),

    #[error("Failed to send HTTP request: {0}")]
    HttpError(String),

    #[error("Failed to access the database: {0}")]
    DatabaseError(String),

    #[error("Chat connection error: {0}")]
    ChatError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    GeneralError(String),
}

impl BotError {
    /// True only for a rejected access token. Other API failures never
    /// trigger a credential refresh.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

impl From<reqwest::Error> for BotError {
    fn from(error: reqwest::Error) -> Self {
        BotError::HttpError(error.to_string())
    }
}

impl From<rusqlite::Error> for BotError {
    fn from(error: rusqlite::Error) -> Self {
        BotError::DatabaseError(error.to_string())
    }
}

impl From<serde_json::Error> for BotError {
    fn from(error: serde_json::Error) -> Self {
        BotError::ParseError(error.to_string())
    }
}

impl From<std::io::Error> for BotError {
    fn from(error: std::io::Error) -> Self {
        BotError::ChatError(error.to_string())
    }
}

impl From<anyhow::Error> for BotError {
    fn from(error: anyhow::Error) -> Self {
        BotError::GeneralError(error.to_string())
    }
}
