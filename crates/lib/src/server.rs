//! Relay HTTP server and message pipeline.
//!
//! One port serves the health endpoint and (in webhook mode) the Telegram
//! webhook. Inbound chat messages are relayed to the VOI API; each message is
//! one request→reply transaction with no state kept between steps.

use crate::channels::{
    ChannelHandle, ChannelRegistry, InboundMessage, TelegramChannel, TelegramUpdate,
    TELEGRAM_CHANNEL_ID,
};
use crate::config::{self, Config};
use crate::correlate;
use crate::relay::VoiClient;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Greeting sent in response to the /start command.
const START_GREETING: &str =
    "Привет! Я помощник ВОИ. Задайте мне вопрос об оформлении инвалидности, ТСР или других мерах поддержки.";

const START_COMMAND: &str = "/start";

/// Shared state for the server (config, VOI client, channels).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub voi_client: VoiClient,
    /// True when the Telegram connector was started (bot token configured).
    pub bot_active: bool,
    pub channel_registry: Arc<ChannelRegistry>,
    /// Sender for inbound channel messages (long-poll loop or webhook POSTs). Processor task receives.
    pub inbound_tx: mpsc::Sender<InboundMessage>,
    /// In-process channel connector tasks; awaited during graceful shutdown.
    pub channel_tasks: Arc<tokio::sync::RwLock<Vec<JoinHandle<()>>>>,
}

/// Health payload: computed per request from the transport flag and configured endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: &'static str,
    pub bot_active: bool,
    pub voi_api_url: String,
}

/// Process one inbound chat message: /start gets the fixed greeting, anything
/// else is correlated and relayed. Exactly one reply is sent per message.
async fn process_inbound_message(state: AppState, msg: InboundMessage) {
    let Some(handle) = state.channel_registry.get(TELEGRAM_CHANNEL_ID).await else {
        log::warn!("inbound: telegram channel not registered, dropping message");
        return;
    };

    if msg.text.trim() == START_COMMAND {
        if handle.send_message(&msg.chat_id, START_GREETING).await.is_err() {
            log::warn!("inbound: greeting send failed");
        }
        return;
    }

    // Typing indicator is best-effort; a failed signal never aborts the relay.
    if let Err(e) = handle.send_typing(&msg.chat_id).await {
        log::debug!("typing indicator failed: {}", e);
    }

    let request = correlate::correlate(&msg);
    let outcome = state.voi_client.relay(&request).await;
    if handle
        .send_message(&msg.chat_id, outcome.reply_text())
        .await
        .is_err()
    {
        log::warn!("inbound: reply send failed (rquId {})", request.rqu_id);
    }
}

/// Run the relay server; binds to config.server.bind:config.server.port.
/// Blocks until shutdown (Ctrl+C or SIGTERM).
pub async fn run_server(config: Config) -> Result<()> {
    let voi_api_url = config::resolve_voi_api_url(&config);
    let voi_client = VoiClient::new(&voi_api_url);
    let channel_tasks = Arc::new(tokio::sync::RwLock::new(Vec::new()));
    let channel_registry = Arc::new(ChannelRegistry::new());
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<InboundMessage>(64);

    let telegram_token = config::resolve_telegram_token(&config);
    if telegram_token.is_none() {
        log::warn!("TELEGRAM_BOT_TOKEN is not set, bot will not start");
    }
    let bot_active = telegram_token.is_some();

    let state = AppState {
        config: Arc::new(config.clone()),
        voi_client,
        bot_active,
        channel_registry: channel_registry.clone(),
        inbound_tx: inbound_tx.clone(),
        channel_tasks: channel_tasks.clone(),
    };

    {
        let state_inbound = state.clone();
        tokio::spawn(async move {
            while let Some(msg) = inbound_rx.recv().await {
                // Each message is an independent task; replies are unordered by design.
                tokio::spawn(process_inbound_message(state_inbound.clone(), msg));
            }
        });
    }

    let webhook_url = config.channels.telegram.webhook_url.clone();
    let telegram_webhook_for_shutdown: Option<Arc<TelegramChannel>> =
        if let Some(token) = telegram_token {
            let telegram = Arc::new(TelegramChannel::new(Some(token)));
            if let Some(ref url) = webhook_url {
                let secret = config.channels.telegram.webhook_secret.as_deref();
                if let Err(e) = telegram.set_webhook(url, secret).await {
                    log::warn!("telegram set_webhook failed: {}", e);
                } else {
                    log::info!("telegram channel registered (webhook mode): {}", url);
                }
                channel_registry
                    .register(telegram.id().to_string(), telegram.clone())
                    .await;
                Some(telegram)
            } else {
                let handle = telegram.clone().start_inbound(inbound_tx);
                channel_tasks.write().await.push(handle);
                channel_registry
                    .register(telegram.id().to_string(), telegram)
                    .await;
                log::info!("telegram channel registered and getUpdates loop started");
                None
            }
        } else {
            None
        };

    let app = Router::new()
        .route("/api/health", get(health_http))
        .route("/telegram/webhook", post(telegram_webhook))
        .with_state(state);

    let bind_addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            channel_registry,
            channel_tasks,
            telegram_webhook_for_shutdown,
        ))
        .await
        .context("server exited")?;
    log::info!("server stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Stops channel connectors so no new messages are accepted, removes the Telegram
/// webhook if used, then awaits in-process channel tasks. In-flight relay calls
/// finish on their own.
async fn shutdown_signal(
    channel_registry: Arc<ChannelRegistry>,
    channel_tasks: Arc<tokio::sync::RwLock<Vec<JoinHandle<()>>>>,
    telegram_webhook: Option<Arc<TelegramChannel>>,
) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, stopping channels");

    for id in channel_registry.ids().await {
        if let Some(handle) = channel_registry.get(&id).await {
            handle.stop();
        }
    }

    if let Some(t) = telegram_webhook {
        if let Err(e) = t.delete_webhook().await {
            log::debug!("telegram delete_webhook on shutdown: {}", e);
        }
    }

    let handles = {
        let mut g = channel_tasks.write().await;
        std::mem::take(&mut *g)
    };
    for h in handles {
        let _ = h.await;
    }
    log::info!("channel tasks finished");
}

/// POST /telegram/webhook — receives Telegram update JSON; verifies optional secret, pushes InboundMessage.
async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(ref expected) = state.config.channels.telegram.webhook_secret {
        let provided = headers
            .get("X-Telegram-Bot-Api-Secret-Token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected.as_str() {
            return StatusCode::FORBIDDEN;
        }
    }
    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    let Some(inbound) = update.to_inbound() else {
        return StatusCode::OK;
    };
    if state.inbound_tx.send(inbound).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// GET /api/health — always 200; a missing bot token shows up as botActive: false.
async fn health_http(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        bot_active: state.bot_active,
        voi_api_url: state.voi_client.base_url().to_string(),
    })
}
