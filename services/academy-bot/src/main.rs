//! Academy assistant bot
//!
//! Single-binary Rust service that:
//! 1. Verifies its Telegram bot token
//! 2. Long-polls for updates and answers menu choices from static content
//! 3. Forwards AI-mode questions to Gemini through a rotating key pool
//! 4. Serves health and Prometheus metrics on a separate admin listener

mod admin;
mod bot;
mod config;
mod error;
mod metrics;
mod service;
mod session;
mod telegram;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use key_pool::{CompletionClient, CredentialPool};
use provider::GeminiBackend;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::Bot;
use crate::config::Config;
use crate::service::{
    BotHandle, DRAIN_TIMEOUT, ServiceAction, ServiceEvent, ServiceMetrics, ServiceState,
    handle_event,
};
use crate::telegram::TelegramApi;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting academy-bot");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // --- State: Initializing ---
    let mut state = ServiceState::Initializing;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    let explicit_path = cli_config_path.is_some() || std::env::var_os("CONFIG_PATH").is_some();
    let config = if explicit_path || config_path.exists() {
        info!(path = %config_path.display(), "loading configuration");
        Config::load(&config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        info!(path = %config_path.display(), "no config file, using defaults");
        Config::from_toml("").context("failed to resolve configuration")?
    };

    let token = config
        .telegram
        .token
        .clone()
        .context("no bot token: set TELEGRAM_BOT_TOKEN or telegram.token_file")?;

    info!(
        model = %config.gemini.model,
        credentials = config.gemini.api_keys.len(),
        start_index = config.gemini.start_index,
        admin_addr = %config.admin.listen_addr,
        "configuration loaded"
    );

    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;

    let backend = GeminiBackend::new(
        http.clone(),
        config.gemini.api_base_url.clone(),
        config.gemini.model.clone(),
        Duration::from_secs(config.gemini.timeout_secs),
    );
    let template = config.gemini.prompt_template();
    let pool = CredentialPool::new(config.gemini.api_keys, config.gemini.start_index);
    let completions = Arc::new(CompletionClient::new(
        pool,
        Arc::new(backend),
        template,
        config.placeholders.into(),
    ));

    let api = TelegramApi::new(
        http,
        config.telegram.api_base_url.clone(),
        token,
        Duration::from_secs(config.telegram.poll_timeout_secs),
    );

    // Transition: Initializing -> Connecting
    let (new_state, action) = handle_event(state, ServiceEvent::ConfigLoaded);
    state = new_state;
    match action {
        ServiceAction::Connect => {}
        _ => anyhow::bail!("unexpected action after ConfigLoaded: {action:?}"),
    };

    // Execute Connect with retry per the state machine
    let identity = loop {
        let event = match api.get_me().await {
            Ok(me) => {
                info!(bot_id = me.id, username = ?me.username, "bot token verified");
                break me;
            }
            Err(crate::error::Error::TransportAuth) => ServiceEvent::TokenRejected,
            Err(e) => ServiceEvent::ConnectError(e.to_string()),
        };

        let (new_state, action) = handle_event(state, event);
        state = new_state;
        match action {
            ServiceAction::ScheduleRetry { delay } => {
                if let ServiceState::Error { error, .. } = &state {
                    warn!(
                        error = %error,
                        retry_in_secs = delay.as_secs(),
                        "Telegram connection failed, retrying"
                    );
                }
                let event = tokio::select! {
                    _ = tokio::time::sleep(delay) => ServiceEvent::RetryTimer,
                    _ = shutdown_signal() => ServiceEvent::ShutdownSignal,
                };
                let (new_state, action) = handle_event(state, event);
                state = new_state;
                if let ServiceAction::Shutdown { exit_code } = action {
                    info!("shutdown requested while connecting");
                    std::process::exit(exit_code);
                }
            }
            ServiceAction::Shutdown { exit_code } => {
                error!("Telegram rejected the bot token or stayed unreachable, giving up");
                std::process::exit(exit_code);
            }
            _ => anyhow::bail!("unexpected action while connecting: {action:?}"),
        }
    };

    // Transition: Connecting -> Running
    let handle = BotHandle {
        id: identity.id,
        username: identity.username,
    };
    let (new_state, action) = handle_event(state, ServiceEvent::Connected(handle.clone()));
    state = new_state;
    match action {
        ServiceAction::StartPolling => {}
        _ => anyhow::bail!("unexpected action after Connected: {action:?}"),
    };

    let service_metrics = ServiceMetrics::new();

    let admin_state = admin::AppState {
        metrics: service_metrics.clone(),
        completions: completions.clone(),
        bot: handle,
        prometheus: prometheus_handle,
    };
    let admin_app = admin::build_router(admin_state, config.admin.max_connections);
    let admin_listener = TcpListener::bind(config.admin.listen_addr)
        .await
        .with_context(|| format!("failed to bind admin listener to {}", config.admin.listen_addr))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut admin_shutdown = shutdown_rx.clone();
    let admin_handle = tokio::spawn(async move {
        axum::serve(admin_listener, admin_app)
            .with_graceful_shutdown(async move {
                let _ = admin_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    let bot = Arc::new(Bot::new(
        api,
        completions,
        config.content,
        service_metrics.clone(),
    ));
    let mut polling = tokio::spawn(bot::run_polling(
        bot,
        shutdown_rx,
        config.telegram.drop_pending_updates,
    ));

    if let ServiceState::Running { bot } = &state {
        info!(
            bot_id = bot.id,
            admin_addr = %config.admin.listen_addr,
            "state: Running, polling for updates"
        );
    }

    // Wait for the OS signal, or for polling to end on its own
    let event = tokio::select! {
        _ = shutdown_signal() => ServiceEvent::ShutdownSignal,
        _ = &mut polling => ServiceEvent::PollingStopped,
    };
    let (new_state, action) = handle_event(state, event);
    state = new_state;

    // Signal polling and the admin listener to stop
    let _ = shutdown_tx.send(true);

    let exit_code = match action {
        ServiceAction::Drain { deadline } => {
            let event = match tokio::time::timeout_at(deadline.into(), &mut polling).await {
                Ok(Ok(())) => {
                    info!("all in-flight updates drained");
                    ServiceEvent::Drained
                }
                Ok(Err(e)) => {
                    error!(error = %e, "polling task panicked");
                    ServiceEvent::Drained
                }
                Err(_) => {
                    warn!(
                        remaining = service_metrics.in_flight.load(Ordering::Relaxed),
                        drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                        "drain timeout exceeded, forcing shutdown"
                    );
                    ServiceEvent::DrainTimeout
                }
            };
            match handle_event(state, event) {
                (_, ServiceAction::Shutdown { exit_code }) => exit_code,
                (state, action) => {
                    anyhow::bail!("unexpected transition while draining: {state:?} {action:?}")
                }
            }
        }
        ServiceAction::Shutdown { exit_code } => {
            error!("polling stopped unexpectedly");
            exit_code
        }
        _ => anyhow::bail!("unexpected action while running: {action:?}"),
    };

    match tokio::time::timeout(DRAIN_TIMEOUT, admin_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!(error = %e, "admin server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "admin server task panicked"),
        Err(_) => warn!("admin server did not stop in time"),
    }

    info!(exit_code, "shutdown complete");
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
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
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
