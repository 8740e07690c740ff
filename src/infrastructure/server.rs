// Dev server: serves the artifact store and pushes reload messages over a WebSocket.

use crate::core::interfaces::ReloadSignal;
use crate::utils::{KilnError, Logger, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use dashmap::DashMap;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tower_http::services::ServeDir;
use uuid::Uuid;

pub const RELOAD_ROUTE: &str = "/__kiln/reload";
pub const CLIENT_ROUTE: &str = "/__kiln/client.js";

const CLIENT_SCRIPT: &str = r#"(function () {
  var protocol = location.protocol === "https:" ? "wss://" : "ws://";
  function connect() {
    var socket = new WebSocket(protocol + location.host + "/__kiln/reload");
    socket.onmessage = function (event) {
      var message = JSON.parse(event.data);
      if (message.type === "full-reload") {
        location.reload();
      }
    };
    socket.onclose = function () {
      setTimeout(connect, 1000);
    };
  }
  connect();
})();
"#;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ReloadMessage {
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "full-reload")]
    FullReload { reason: String },
}

#[derive(Clone)]
struct ServerState {
    root: PathBuf,
    reload_tx: broadcast::Sender<ReloadMessage>,
    clients: Arc<DashMap<String, SystemTime>>,
}

/// Handle to a running dev server
#[derive(Clone)]
pub struct ServerHandle {
    addr: SocketAddr,
    reload_tx: broadcast::Sender<ReloadMessage>,
    clients: Arc<DashMap<String, SystemTime>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn connected_clients(&self) -> usize {
        self.clients.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.reload_tx.subscribe()
    }

    /// Returns how many listeners received the message.
    pub fn trigger_full_reload(&self, reason: &str) -> usize {
        let message = ReloadMessage::FullReload {
            reason: reason.to_string(),
        };
        // No receivers just means no browser is open.
        self.reload_tx.send(message).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl ReloadSignal for ServerHandle {
    async fn reload(&self) -> Result<()> {
        let notified = self.trigger_full_reload("rebuild");
        Logger::debug(&format!("Reload sent to {} listener(s)", notified));
        Ok(())
    }
}

/// Bind and spawn the server. The artifact store root is served as-is.
pub async fn serve(root: PathBuf, config: &ServerConfig) -> Result<ServerHandle> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| KilnError::Server(format!("Cannot bind {}: {}", addr, e)))?;
    let local_addr = listener.local_addr()?;

    let (reload_tx, _) = broadcast::channel(16);
    let clients = Arc::new(DashMap::new());
    let state = ServerState {
        root,
        reload_tx: reload_tx.clone(),
        clients: clients.clone(),
    };

    let app = router(state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            Logger::error(&format!("Dev server stopped: {}", e));
        }
    });

    let handle = ServerHandle {
        addr: local_addr,
        reload_tx,
        clients,
    };
    Logger::info(&format!("🌐 Local: {}", handle.url()));

    Ok(handle)
}

fn router(state: ServerState) -> Router {
    let serve_dir = ServeDir::new(&state.root);

    Router::new()
        .route("/", get(handle_index))
        .route("/index.html", get(handle_index))
        .route(CLIENT_ROUTE, get(handle_client_script))
        .route(RELOAD_ROUTE, get(handle_reload_socket))
        .fallback_service(serve_dir)
        .with_state(state)
}

async fn handle_index(State(state): State<ServerState>) -> Response {
    match tokio::fs::read_to_string(state.root.join("index.html")).await {
        Ok(html) => Html(inject_client(&html)).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "index.html not found").into_response(),
    }
}

async fn handle_client_script() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], CLIENT_SCRIPT)
}

async fn handle_reload_socket(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(move |socket| handle_client(socket, state))
}

async fn handle_client(mut socket: WebSocket, state: ServerState) {
    let client_id = Uuid::new_v4().to_string();
    state.clients.insert(client_id.clone(), SystemTime::now());
    Logger::debug(&format!("Reload client connected: {}", client_id));

    let mut updates = state.reload_tx.subscribe();

    if send_message(&mut socket, &ReloadMessage::Connected).await.is_ok() {
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Ok(message) => {
                        if send_message(&mut socket, &message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                incoming = socket.recv() => match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    state.clients.remove(&client_id);
    Logger::debug(&format!("Reload client disconnected: {}", client_id));
}

async fn send_message(socket: &mut WebSocket, message: &ReloadMessage) -> std::result::Result<(), axum::Error> {
    let text = serde_json::to_string(message).map_err(axum::Error::new)?;
    socket.send(Message::Text(text)).await
}

/// Add the reload client script before `</body>`, or at the end when there is none.
pub fn inject_client(html: &str) -> String {
    let tag = format!("<script src=\"{}\"></script>", CLIENT_ROUTE);

    match html.to_ascii_lowercase().rfind("</body>") {
        Some(index) => format!("{}{}\n{}", &html[..index], tag, &html[index..]),
        None => format!("{}\n{}\n", html, tag),
    }
}
