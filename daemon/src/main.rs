//! cinder daemon: HTTP and WebSocket front end for the work server.
//!
//! `POST /` dispatches a JSON command body. The queue resource at
//! `/api/v1/work/queue` answers `GET` with an introspection snapshot and
//! `DELETE` with a purge (subject to the control setting). Text frames on
//! `/ws` carry the same command schema; responses are correlated through
//! the optional `id` field.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use cinder_server::{init_logging, Config, Dispatcher, LogFormat, WorkScheduler};

#[derive(Parser)]
#[command(name = "cinder-daemon", about = "Blake2b proof-of-work generation service")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "CINDER_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address.
    #[arg(long, env = "CINDER_BIND")]
    bind: Option<String>,

    /// Listen port.
    #[arg(long, env = "CINDER_PORT")]
    port: Option<u16>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "CINDER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "CINDER_LOG_FORMAT")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_toml_file(&path.display().to_string())?,
        None => Config::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = cli.log_level {
        config.server.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.server.log_format = format;
    }

    let format: LogFormat = config.server.log_format.parse()?;
    init_logging(format, &config.server.log_level);

    if let Some(path) = &cli.config {
        info!("loaded config from {}", path.display());
    }
    if config.devices.is_empty() {
        warn!("no devices configured; work_generate requests will be refused");
    }
    info!(
        devices = config.devices.len(),
        request_limit = config.server.request_limit,
        "starting cinder work server"
    );

    let scheduler = Arc::new(WorkScheduler::new(&config));
    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let dispatcher = Arc::new(Dispatcher::new(config, scheduler));

    let app = Router::new()
        .route("/", post(handle_post))
        .route(
            "/api/v1/work/queue",
            get(handle_queue_get).delete(handle_queue_delete),
        )
        .route("/ws", get(ws_handler))
        .with_state(dispatcher);

    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("cinder daemon exited cleanly");
    Ok(())
}

async fn handle_post(State(dispatcher): State<Arc<Dispatcher>>, body: String) -> String {
    dispatcher.handle_command(&body).await
}

async fn handle_queue_get(State(dispatcher): State<Arc<Dispatcher>>) -> String {
    dispatcher.handle_queue_list()
}

async fn handle_queue_delete(State(dispatcher): State<Arc<Dispatcher>>) -> String {
    dispatcher.handle_queue_purge()
}

/// Upgrade an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(dispatcher): State<Arc<Dispatcher>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, dispatcher))
}

/// Handle a single WebSocket connection.
///
/// Each text frame is dispatched on its own task so a long-running
/// generate does not block cancels or validates on the same connection;
/// clients tell responses apart by their correlation id.
async fn handle_socket(socket: WebSocket, dispatcher: Arc<Dispatcher>) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let ws_sender = Arc::new(tokio::sync::Mutex::new(ws_sender));

    debug!("new websocket client connected");

    while let Some(msg_result) = ws_receiver.next().await {
        let msg = match msg_result {
            Ok(msg) => msg,
            Err(e) => {
                warn!("websocket receive error: {e}");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                let dispatcher = Arc::clone(&dispatcher);
                let sender = Arc::clone(&ws_sender);
                tokio::spawn(async move {
                    let response = dispatcher.handle_command(&text).await;
                    let mut sender = sender.lock().await;
                    let _ = sender.send(Message::Text(response)).await;
                });
            }
            Message::Ping(data) => {
                let mut sender = ws_sender.lock().await;
                let _ = sender.send(Message::Pong(data)).await;
            }
            Message::Close(_) => {
                debug!("websocket client sent close frame");
                break;
            }
            _ => {}
        }
    }

    debug!("websocket client disconnected");
}

/// Resolve when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

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
        _ = ctrl_c => { info!("received SIGINT, shutting down"); }
        _ = terminate => { info!("received SIGTERM, shutting down"); }
    }
}
