//! Gridcast server binary, a local emulator for a cloud event-routing
//! service.
//!
//! Binds one HTTP listener per configured topic, authenticates publishers,
//! validates events against the topic's wire schema, and fans accepted
//! events out to webhook and Service-Bus subscribers. Shuts down gracefully
//! on SIGTERM/SIGINT.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use gridcast_dispatch::{handshake::HandshakeRunner, Dispatcher};
use gridcast_server::{config, topic_app, AppState};
use gridcast_types::TopicRegistry;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("GRIDCAST_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("gridcast.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration; the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Validate the topic document and build the registry. Any violation
    // aborts here, before a single port binds.
    let registry = TopicRegistry::new(config.topics, Utc::now())
        .expect("invalid topic configuration; fix the errors above and restart");

    let dispatcher =
        Arc::new(Dispatcher::new().expect("failed to build outbound HTTP clients"));

    // Kick off the webhook subscription handshakes in the background.
    let handshake_runner = HandshakeRunner::new(config.server.host.clone())
        .expect("failed to build handshake HTTP client");
    handshake_runner.sweep(&registry);

    // Bind one listener per enabled topic.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    for topic in registry.topics() {
        if topic.disabled {
            tracing::info!(topic = %topic.name, "skipping disabled topic");
            continue;
        }

        let state = AppState {
            topic: Arc::clone(topic),
            dispatcher: Arc::clone(&dispatcher),
        };
        let app = topic_app(state);
        let addr = SocketAddr::new(config.server.bind, topic.port);

        let listener = TcpListener::bind(addr)
            .await
            .expect("failed to bind topic port; is another process using it?");

        tracing::info!(
            topic = %topic.name,
            %addr,
            schema = topic.schema.as_str(),
            "topic listener started"
        );

        let mut shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.changed().await;
                })
                .await
                .expect("server error");
        }));
    }

    if handles.is_empty() {
        tracing::warn!("no enabled topics configured, nothing to serve");
        return;
    }

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }

    tracing::info!("gridcast server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
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
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
