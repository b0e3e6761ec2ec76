use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;

use courier_api::state::AppState;
use courier_bot::supervisor::{RestartPolicy, Supervisor};
use courier_common::config::AppConfig;
use courier_common::types::ChatId;
use courier_engine::Services;
use courier_engine::commands::CommandParser;
use courier_engine::processor::{CommandProcessor, ProcessorSettings};
use courier_engine::scheduler::BroadcastScheduler;
use courier_imagegen::ImageOrchestrator;
use courier_notifier::{TelegramClient, Transport, TransportError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "courier_bot=info,courier_engine=info,courier_imagegen=info,courier_notifier=info,courier_api=info"
                    .into()
            }),
        )
        .json()
        .init();

    tracing::info!("Courier bot starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;

    let transport: Arc<dyn Transport> = Arc::new(TelegramClient::new(
        http.clone(),
        &config.telegram_api_url,
        &config.telegram_bot_token,
    ));

    // A rejected token is a configuration error; anything else is left to the supervisor.
    match transport.identify().await {
        Ok(username) => tracing::info!(%username, "Connected to Telegram"),
        Err(TransportError::Api { code: 401 | 404, description }) => {
            anyhow::bail!("TELEGRAM_BOT_TOKEN rejected by the Bot API: {description}");
        }
        Err(e) => tracing::warn!(error = %e, "Identity check failed, continuing"),
    }

    let orchestrator = ImageOrchestrator::from_config(&config, http);
    let services = Services::from_config(&config, orchestrator, transport.clone())?;

    let processor = Arc::new(CommandProcessor::new(
        CommandParser::new(config.trigger_phrases.clone()),
        services.clone(),
        ProcessorSettings {
            unauthorized_policy: config.unauthorized_policy,
            caption: config.caption.clone(),
            developer_chat: config.developer_chat_id.map(ChatId),
        },
    ));

    let supervisor = Supervisor::new(
        transport,
        processor,
        RestartPolicy::default(),
        Duration::from_secs(config.poll_timeout_secs),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if let Some(addr) = config.status_addr {
        let state = AppState::new(supervisor.status());
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = courier_api::serve(addr, state, shutdown).await {
                tracing::error!(%addr, error = %e, "Status server exited with error");
            }
        });
    }

    let scheduler = BroadcastScheduler::new(
        config.broadcast_time,
        config.broadcast_caption.clone(),
        services,
    )
    .spawn(shutdown_rx.clone())?;

    let receiver = tokio::spawn(supervisor.run(shutdown_rx));

    tracing::info!(
        subscribers = config.allowed_user_ids.len(),
        broadcast_time = %config.broadcast_time,
        "Courier bot running"
    );

    shutdown_signal().await;
    tracing::info!("Received shutdown signal, stopping gracefully...");
    let _ = shutdown_tx.send(true);

    if let Err(e) = receiver.await {
        tracing::error!(error = %e, "Supervisor task failed");
    }
    if let Err(e) = scheduler.await {
        tracing::error!(error = %e, "Scheduler task failed");
    }

    tracing::info!("Courier bot stopped.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
