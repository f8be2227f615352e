//! Twitch Helix and OAuth HTTP client
//!
//! Covers the three calls the bot makes with a user's credentials: sending a
//! chat message, refreshing an access token, and looking up a user by login.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::core::models::RefreshedTokens;
use crate::errors::BotError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A Twitch account as returned by `helix/users`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TwitchUser {
    pub id: String,
    pub login: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SentMessage {
    pub message_id: String,
    pub is_sent: bool,
    #[serde(default)]
    pub drop_reason: Option<DropReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DropReason {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    broadcaster_id: &'a str,
    sender_id: &'a str,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

/// Chat network HTTP operations that act on behalf of a user.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// # Errors
    ///
    /// Returns [`BotError::Unauthorized`] when the access token is rejected,
    /// any other variant for every other failure.
    async fn send_message(
        &self,
        access_token: &str,
        broadcaster_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<SentMessage, BotError>;

    /// # Errors
    ///
    /// Returns an error if the exchange is rejected or cannot be parsed. A
    /// rejected exchange is never reported as `Unauthorized`.
    async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshedTokens, BotError>;

    /// # Errors
    ///
    /// Returns [`BotError::NotFound`] when no account has that login.
    async fn get_user(&self, access_token: &str, login: &str) -> Result<TwitchUser, BotError>;
}

pub struct TwitchApi {
    http: Client,
    client_id: String,
    client_secret: String,
    api_base: String,
    auth_base: String,
}

impl TwitchApi {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        client_id: String,
        client_secret: String,
        api_base: &str,
        auth_base: &str,
    ) -> Result<Self, BotError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BotError::HttpError(format!("Failed to build Twitch HTTP client: {e}")))?;

        Ok(Self {
            http,
            client_id,
            client_secret,
            api_base: api_base.trim_end_matches('/').to_string(),
            auth_base: auth_base.trim_end_matches('/').to_string(),
        })
    }
}

async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read body>".to_string())
}

#[async_trait]
impl ChatApi for TwitchApi {
    async fn send_message(
        &self,
        access_token: &str,
        broadcaster_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<SentMessage, BotError> {
        let body = SendMessageRequest {
            broadcaster_id,
            sender_id,
            message: text,
        };
        let response = self
            .http
            .post(format!("{}/helix/chat/messages", self.api_base))
            .bearer_auth(access_token)
            .header("Client-Id", &self.client_id)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(BotError::Unauthorized(error_body(response).await));
        }
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(BotError::ApiError(format!(
                "send message: invalid status code {status}: {body}"
            )));
        }

        let envelope: DataEnvelope<SentMessage> = response
            .json()
            .await
            .map_err(|e| BotError::ParseError(format!("send message response: {e}")))?;
        let sent = envelope
            .data
            .into_iter()
            .next()
            .ok_or_else(|| BotError::ParseError("send message: empty data".to_string()))?;

        if !sent.is_sent {
            let reason = sent
                .drop_reason
                .as_ref()
                .map_or_else(|| "unknown".to_string(), |r| format!("{}: {}", r.code, r.message));
            return Err(BotError::ApiError(format!("message dropped ({reason})")));
        }

        debug!(message_id = %sent.message_id, "chat message sent");
        Ok(sent)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshedTokens, BotError> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let response = self
            .http
            .post(format!("{}/oauth2/token", self.auth_base))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(BotError::ApiError(format!(
                "refresh access token: non ok response {status}: {body}"
            )));
        }

        response
            .json::<RefreshedTokens>()
            .await
            .map_err(|e| BotError::ParseError(format!("refresh access token response: {e}")))
    }

    async fn get_user(&self, access_token: &str, login: &str) -> Result<TwitchUser, BotError> {
        let response = self
            .http
            .get(format!("{}/helix/users", self.api_base))
            .query(&[("login", login)])
            .bearer_auth(access_token)
            .header("Client-Id", &self.client_id)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(BotError::Unauthorized(error_body(response).await));
        }
        if !status.is_success() {
            return Err(BotError::ApiError(format!(
                "get user: invalid status code {status}"
            )));
        }

        let envelope: DataEnvelope<TwitchUser> = response
            .json()
            .await
            .map_err(|e| BotError::ParseError(format!("get user response: {e}")))?;
        envelope
            .data
            .into_iter()
            .next()
            .ok_or_else(|| BotError::NotFound(format!("twitch user {login}")))
    }
}
