//! Anonymous Twitch chat (IRC) client
//!
//! Read-only connection: replies go out through the Helix API, so the client
//! logs in as a `justinfan` guest and only listens.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::models::{Message, MessageType, normalize_channel_name};
use crate::errors::BotError;

pub type MessageCallback = Arc<dyn Fn(Message) + Send + Sync>;

/// Callback-driven chat network connection.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Connects and reads until the connection ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or fails
    /// while reading. A close initiated by the server resolves to `Ok`.
    async fn connect(&self) -> Result<(), BotError>;

    /// Replaces the callback invoked once per inbound event.
    fn on_message(&self, callback: MessageCallback);

    fn clear_callback(&self);

    /// Joins channels now if connected, otherwise on the next connect.
    fn join(&self, channels: &[String]);

    fn part(&self, channel: &str);
}

#[derive(Default)]
struct IrcState {
    channels: BTreeSet<String>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    callback: Option<MessageCallback>,
}

pub struct IrcClient {
    address: String,
    nick: String,
    state: Mutex<IrcState>,
}

impl IrcClient {
    #[must_use]
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            nick: format!("justinfan{}", rand::random_range(10_000..100_000)),
            state: Mutex::new(IrcState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, IrcState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, message: Message) {
        let callback = self.state().callback.clone();
        if let Some(callback) = callback {
            callback(message);
        }
    }
}

#[async_trait]
impl ChatClient for IrcClient {
    async fn connect(&self) -> Result<(), BotError> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| BotError::ChatError(format!("connect {}: {e}", self.address)))?;
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let handshake = format!(
            "CAP REQ :twitch.tv/tags twitch.tv/commands\r\nPASS SCHMOOPIIE\r\nNICK {}\r\n",
            self.nick
        );
        write_half.write_all(handshake.as_bytes()).await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        {
            let mut state = self.state();
            for channel in &state.channels {
                let _ = tx.send(format!("JOIN #{channel}"));
            }
            state.outbound = Some(tx);
        }
        info!(address = %self.address, nick = %self.nick, "connected to twitch chat");

        let result = loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => {
                            info!("twitch chat closed the connection");
                            break Ok(());
                        }
                        Err(e) => break Err(BotError::ChatError(format!("read: {e}"))),
                    };
                    let Some(parsed) = IrcLine::parse(&line) else {
                        continue;
                    };
                    match parsed.command {
                        "PING" => {
                            let pong = format!("PONG :{}\r\n", parsed.trailing.unwrap_or("tmi.twitch.tv"));
                            if let Err(e) = write_half.write_all(pong.as_bytes()).await {
                                break Err(BotError::ChatError(format!("write: {e}")));
                            }
                        }
                        "NOTICE" if parsed.trailing.is_some_and(|t| t.contains("authentication failed")) => {
                            break Err(BotError::ChatError("login authentication failed".to_string()));
                        }
                        "RECONNECT" => {
                            warn!("twitch chat requested a reconnect");
                            self.dispatch(parsed.to_message());
                            break Ok(());
                        }
                        _ => self.dispatch(parsed.to_message()),
                    }
                }
                Some(out) = rx.recv() => {
                    debug!(command = %out, "irc send");
                    if let Err(e) = write_half.write_all(format!("{out}\r\n").as_bytes()).await {
                        break Err(BotError::ChatError(format!("write: {e}")));
                    }
                }
            }
        };

        self.state().outbound = None;
        result
    }

    fn on_message(&self, callback: MessageCallback) {
        self.state().callback = Some(callback);
    }

    fn clear_callback(&self) {
        self.state().callback = None;
    }

    fn join(&self, channels: &[String]) {
        let mut state = self.state();
        for channel in channels {
            let name = normalize_channel_name(channel);
            if let Some(outbound) = &state.outbound {
                let _ = outbound.send(format!("JOIN #{name}"));
            }
            state.channels.insert(name);
        }
    }

    fn part(&self, channel: &str) {
        let mut state = self.state();
        let name = normalize_channel_name(channel);
        if let Some(outbound) = &state.outbound {
            let _ = outbound.send(format!("PART #{name}"));
        }
        state.channels.remove(&name);
    }
}

/// One raw IRC line split into its parts.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct IrcLine<'a> {
    pub tags: Vec<(&'a str, &'a str)>,
    pub prefix: Option<&'a str>,
    pub command: &'a str,
    pub params: Vec<&'a str>,
    pub trailing: Option<&'a str>,
}

impl<'a> IrcLine<'a> {
    pub(crate) fn parse(line: &'a str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        let mut tags = Vec::new();
        if let Some(stripped) = rest.strip_prefix('@') {
            let (raw_tags, remainder) = stripped.split_once(' ')?;
            tags = raw_tags
                .split(';')
                .map(|tag| tag.split_once('=').unwrap_or((tag, "")))
                .collect();
            rest = remainder.trim_start();
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (raw_prefix, remainder) = stripped.split_once(' ')?;
            prefix = Some(raw_prefix);
            rest = remainder.trim_start();
        }

        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => (rest, None),
        };
        let mut words = head.split_whitespace();
        let command = words.next()?;

        Some(Self {
            tags,
            prefix,
            command,
            params: words.collect(),
            trailing,
        })
    }

    fn tag(&self, key: &str) -> Option<&'a str> {
        self.tags.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    pub(crate) fn to_message(&self) -> Message {
        let sender_username = self
            .prefix
            .and_then(|p| p.split_once('!').map(|(nick, _)| nick))
            .or_else(|| self.tag("login"))
            .unwrap_or_default()
            .to_ascii_lowercase();
        let channel_name = self
            .params
            .iter()
            .find(|p| p.starts_with('#'))
            .map(|p| normalize_channel_name(p))
            .unwrap_or_default();
        let timestamp = self
            .tag("tmi-sent-ts")
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        Message {
            sender_username,
            channel_name,
            text: self.trailing.unwrap_or_default().to_string(),
            message_type: MessageType::from_command(self.command),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const PRIVMSG: &str = "@badge-info=;display-name=Alice;tmi-sent-ts=1700000000000;user-id=7 \
        :alice!alice@alice.tmi.twitch.tv PRIVMSG #bobschannel :!!!hello there";

    #[test]
    fn test_parse_tagged_privmsg() {
        let line = IrcLine::parse(PRIVMSG).unwrap();

        assert_eq!(line.command, "PRIVMSG");
        assert_eq!(line.prefix, Some("alice!alice@alice.tmi.twitch.tv"));
        assert_eq!(line.params, vec!["#bobschannel"]);
        assert_eq!(line.trailing, Some("!!!hello there"));
        assert_eq!(line.tag("display-name"), Some("Alice"));
        assert_eq!(line.tag("badge-info"), Some(""));
    }

    #[test]
    fn test_privmsg_to_message() {
        let message = IrcLine::parse(PRIVMSG).unwrap().to_message();

        assert_eq!(message.sender_username, "alice");
        assert_eq!(message.channel_name, "bobschannel");
        assert_eq!(message.text, "!!!hello there");
        assert_eq!(message.message_type, MessageType::PrivMsg);
        assert_eq!(message.timestamp.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_parse_untagged_join_and_ping() {
        let join = IrcLine::parse(":carol!carol@carol.tmi.twitch.tv JOIN #bobschannel")
            .unwrap()
            .to_message();
        assert_eq!(join.message_type, MessageType::Join);
        assert_eq!(join.sender_username, "carol");
        assert_eq!(join.text, "");

        let ping = IrcLine::parse("PING :tmi.twitch.tv").unwrap();
        assert_eq!(ping.command, "PING");
        assert_eq!(ping.trailing, Some("tmi.twitch.tv"));
        assert!(ping.prefix.is_none());
    }

    #[test]
    fn test_parse_rejects_empty_line() {
        assert!(IrcLine::parse("").is_none());
        assert!(IrcLine::parse("@only-tags").is_none());
    }

    #[tokio::test]
    async fn test_connect_failure_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = IrcClient::new(&address);
        assert!(matches!(client.connect().await, Err(BotError::ChatError(_))));
    }

    #[tokio::test]
    async fn test_connect_replays_joins_and_delivers_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let mut received = Vec::new();
            while let Some(line) = lines.next_line().await.unwrap() {
                let is_join = line.starts_with("JOIN");
                received.push(line);
                if is_join {
                    break;
                }
            }
            write_half
                .write_all(format!("PING :tmi.twitch.tv\r\n{PRIVMSG}\r\n").as_bytes())
                .await
                .unwrap();
            let pong = lines.next_line().await.unwrap().unwrap();
            received.push(pong);
            received
        });

        let client = IrcClient::new(&address);
        client.join(&["#BobsChannel".to_string()]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.on_message(Arc::new(move |message| {
            let _ = tx.send(message);
        }));

        let result = client.connect().await;
        let received = server.await.unwrap();

        assert!(result.is_ok());
        assert!(received.iter().any(|l| l.starts_with("NICK justinfan")));
        assert!(received.contains(&"JOIN #bobschannel".to_string()));
        assert_eq!(received.last().unwrap(), "PONG :tmi.twitch.tv");

        let message = rx.recv().await.unwrap();
        assert_eq!(message.text, "!!!hello there");
        assert_eq!(message.channel_name, "bobschannel");
    }
}
