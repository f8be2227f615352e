/// Twitch GPT - a Twitch chat bot that answers `!!!` questions with ChatGPT.
///
/// The bot listens to the chats of registered broadcasters, keeps only
/// messages that start with the trigger prefix and come from the owner of the
/// channel, asks an OpenAI-compatible backend for an answer, and posts the
/// answer back through the Helix chat API on the owner's behalf.
///
/// # Architecture
///
/// A single linear pipeline:
/// - [`pipeline::ingest`] turns the IRC client's callback into a bounded stream
/// - [`pipeline::filter`] keeps `PRIVMSG`s that carry the trigger prefix
/// - [`pipeline::dispatch`] resolves the sender in the [`registry::Registry`],
///   calls the [`ai::CompletionEngine`], and hands the answer to
///   [`pipeline::send`], which refreshes an expired token once and retries
///
/// The registry is the only state shared with the [`admin::Admin`] service.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use twitch_gpt::ai::OpenAiClient;
/// use twitch_gpt::pipeline::{self, Dispatcher, Sender};
/// use twitch_gpt::registry::Registry;
/// use twitch_gpt::storage::SqliteRepository;
/// use twitch_gpt::twitch::{IrcClient, TwitchApi};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     twitch_gpt::setup_logging(false);
///
///     let repository = Arc::new(SqliteRepository::open_in_memory()?);
///     let chat = Arc::new(IrcClient::new("irc.chat.twitch.tv:6667"));
///     let registry = Arc::new(Registry::new(chat.clone()));
///     let api = Arc::new(TwitchApi::new(
///         "client-id".to_string(),
///         "client-secret".to_string(),
///         "https://api.twitch.tv",
///         "https://id.twitch.tv",
///     )?);
///     let engine = Arc::new(OpenAiClient::new(
///         "https://api.openai.com",
///         "sk-...".to_string(),
///         "gpt-4o-mini".to_string(),
///         "Answer Twitch chat in one short sentence.".to_string(),
///     )?);
///
///     pipeline::seed_registry(repository.as_ref(), &registry).await?;
///     let sender = Arc::new(Sender::new(api, registry.clone(), repository));
///     let dispatcher = Dispatcher::new(registry, engine, sender);
///
///     let cancel = CancellationToken::new();
///     let running = pipeline::start(chat, dispatcher, 256, &cancel);
///     running.connection.await??;
///     Ok(())
/// }
/// ```
// Module declarations
pub mod admin;
pub mod ai;
pub mod core;
pub mod errors;
pub mod pipeline;
pub mod registry;
pub mod storage;
pub mod twitch;

pub use errors::BotError;

/// Configure structured JSON logging.
///
/// The filter comes from `RUST_LOG` when set, otherwise `debug` or `info`
/// depending on `debug`. Calling this more than once keeps the first
/// subscriber.
///
/// # Example
///
/// ```
/// twitch_gpt::setup_logging(false);
/// ```
pub fn setup_logging(debug: bool) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let fmt_layer = tracing_subscriber::fmt::layer().json().with_target(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
