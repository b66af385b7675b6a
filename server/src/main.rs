//! WeChat bridge server.
//!
//! Serves the `/wechat` webhook for one official account and answers through
//! a chat-messages backend. Slow answers are delivered on platform retries or
//! pushed through the customer-service API when credentials are configured.
//!
//! Run with: cargo run --bin wechat-bridge
//! Webhook: http://localhost:8080/wechat
//! Health: http://localhost:8080/health/ready
//! Metrics: http://localhost:8080/metrics

mod config;

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wechat_bridge_backend::{AccessTokenCache, ChatApiClient, CustomMessageSender};
use wechat_bridge_core::Session;
use wechat_bridge_core::environment::{Clock, SystemClock};
use wechat_bridge_core::handlers::HandlerRegistry;
use wechat_bridge_core::push::PushSender;
use wechat_bridge_core::storage::InMemoryConversationStore;
use wechat_bridge_runtime::metrics::MetricsExporter;
use wechat_bridge_runtime::{MessageStatusRegistry, RegistryConfig, RetryCoordinator};
use wechat_bridge_web::{AppState, build_router};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = Config::from_env();
    config.validate()?;
    let settings = config.endpoint_settings();

    info!(
        encrypted = settings.is_encrypted_mode(),
        push = settings.push_credentials().is_some(),
        handler_timeout = ?config.coordinator_config().handler_timeout,
        "Starting WeChat bridge"
    );
    if settings.token().is_none() {
        warn!("WECHAT_TOKEN not set, every webhook call will fail");
    }
    if config.chat.api_key.is_empty() {
        warn!("CHAT_API_KEY not set, chat requests will be rejected by the backend");
    }

    let metrics = MetricsExporter::install().context("Failed to install metrics exporter")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = MessageStatusRegistry::new(Arc::clone(&clock), RegistryConfig::default());

    let push = settings.push_credentials().map(|(app_id, app_secret)| {
        let tokens = Arc::new(AccessTokenCache::new(Arc::clone(&clock)));
        let sender = CustomMessageSender::new(app_id, app_secret, tokens)
            .with_api_base(config.wechat.api_base.as_str());
        Arc::new(sender) as Arc<dyn PushSender>
    });
    if push.is_none() {
        warn!("WECHAT_APP_ID/WECHAT_APP_SECRET not set, slow answers rely on platform retries");
    }

    let chat = Arc::new(ChatApiClient::new(
        config.chat.api_base.as_str(),
        config.chat.api_key.as_str(),
    ));
    let session = Session::new(chat, Arc::new(InMemoryConversationStore::new()));

    let coordinator = RetryCoordinator::new(
        Arc::clone(&registry),
        push,
        config.coordinator_config(),
    );
    let state = AppState::new(settings, coordinator, HandlerRegistry::new(), session, clock)
        .with_metrics(metrics);
    let app = build_router(state);

    let addr = config.bind_address()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "HTTP server listening");

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            registry.shutdown();
            return result
                .context("Server task failed")?
                .context("Server error");
        }
        () = shutdown_signal() => {}
    }

    info!("Shutdown signal received, draining in-flight requests");
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(config.shutdown_timeout(), server).await {
        Ok(Ok(Ok(()))) => info!("HTTP server stopped"),
        Ok(Ok(Err(e))) => warn!(error = %e, "HTTP server error during shutdown"),
        Ok(Err(e)) => warn!(error = %e, "Server task failed during shutdown"),
        Err(_) => warn!(
            timeout = ?config.shutdown_timeout(),
            "Shutdown timed out, dropping in-flight requests"
        ),
    }

    registry.shutdown();
    info!("Shutdown complete");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wechat_bridge=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
