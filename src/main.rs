use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use twitch_gpt::ai::OpenAiClient;
use twitch_gpt::core::config::AppConfig;
use twitch_gpt::pipeline::{self, Dispatcher, Sender};
use twitch_gpt::registry::Registry;
use twitch_gpt::storage::SqliteRepository;
use twitch_gpt::twitch::{IrcClient, TwitchApi};

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().map_err(|e| anyhow!("Config error: {e}"))?;
    twitch_gpt::setup_logging(config.debug);

    let repository = Arc::new(
        SqliteRepository::open(Path::new(&config.sqlite_db_path))
            .context("could not open the database")?,
    );
    let chat = Arc::new(IrcClient::new(&config.twitch_irc_address));
    let registry = Arc::new(Registry::new(chat.clone()));
    let api = Arc::new(TwitchApi::new(
        config.twitch_client_id.clone(),
        config.twitch_client_secret.clone(),
        &config.twitch_api_base,
        &config.twitch_auth_base,
    )?);
    let engine = Arc::new(OpenAiClient::new(
        &config.openai_api_base,
        config.openai_api_key.clone(),
        config.chatgpt_model.clone(),
        config.chatgpt_system_message.clone(),
    )?);

    pipeline::seed_registry(repository.as_ref(), &registry)
        .await
        .context("could not load users and channels")?;

    let sender = Arc::new(Sender::new(api, Arc::clone(&registry), repository));
    let dispatcher = Dispatcher::new(registry, engine, sender);

    let cancel = CancellationToken::new();
    let mut running = pipeline::start(chat, dispatcher, config.message_queue_capacity, &cancel);
    info!("message pipeline started");

    let connection_result = tokio::select! {
        () = shutdown_signal() => {
            info!("shutting down...");
            cancel.cancel();
            (&mut running.connection).await
        }
        result = &mut running.connection => {
            cancel.cancel();
            result
        }
    };

    let stats = running.dispatch.await.context("dispatch task panicked")?;
    let dropped = running.dropped.load(Ordering::Relaxed);
    if dropped > 0 {
        warn!(dropped, "messages dropped because the queue was full");
    }
    info!(replies_sent = stats.replies_sent, received = stats.received, "stopped");

    match connection_result.context("connection task panicked")? {
        Ok(()) => Ok(()),
        Err(e) => {
            error!(error = %e, "chat connection failed");
            Err(e.into())
        }
    }
}
