//! HTTP polling transport for the broker.
//!
//! Clients never hold a connection open. Each POST carries a command
//! (possibly empty) and the client's `since` watermark; the broker
//! enqueues, ticks once and returns everything newer — store-and-forward,
//! driven entirely by client heartbeats. If clients stop polling, the
//! world stops ticking.
//!
//! Session identity: `GET /` issues a `sid` cookie on first contact and
//! assigns a [`ClientKey`] (cookie uuid + monotonic serial). The broker
//! only ever sees the key; cookie plumbing stays here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::broker::{Application, Broker};
use crate::message_log::Message;
use crate::session::ClientKey;

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to. Port 0 picks a free port.
    pub bind_addr: String,
    /// How often the idle sweeper runs.
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Poll request body. An empty command is a pure heartbeat.
#[derive(Debug, Deserialize)]
pub struct PollRequest {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub since: u64,
}

/// Poll response body: everything newer than the request's watermark.
#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub messages: Vec<Message>,
}

/// Transport-side session table: cookie → assigned client key.
struct SessionTable {
    keys: HashMap<Uuid, ClientKey>,
    next_serial: u64,
}

impl SessionTable {
    fn new() -> Self {
        Self {
            keys: HashMap::new(),
            next_serial: 1,
        }
    }

    /// Key for `sid`, assigning a fresh one on first contact.
    /// Returns `(key, newly_assigned)`.
    fn key_for(&mut self, sid: Uuid) -> (ClientKey, bool) {
        if let Some(key) = self.keys.get(&sid) {
            return (key.clone(), false);
        }
        let key = ClientKey::new(sid, self.next_serial);
        self.next_serial += 1;
        self.keys.insert(sid, key.clone());
        (key, true)
    }

    fn lookup(&self, sid: &Uuid) -> Option<ClientKey> {
        self.keys.get(sid).cloned()
    }

    fn forget_pruned(&mut self, pruned: &[ClientKey]) {
        self.keys.retain(|_, key| !pruned.contains(key));
    }
}

/// Shared state behind every handler.
pub struct ServerState<A: Application> {
    broker: Mutex<Broker<A>>,
    sessions: Mutex<SessionTable>,
}

/// Build the axum router with all routes.
pub fn build_router<A>(state: Arc<ServerState<A>>) -> Router
where
    A: Application + Send + 'static,
{
    Router::new()
        .route("/", get(index::<A>).post(poll::<A>))
        .with_state(state)
}

/// Handle returned by [`start`] — keeps the background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    _server: JoinHandle<()>,
    _sweeper: JoinHandle<()>,
}

/// Bind, start serving and start the idle sweeper. Returns once the
/// listener is bound; the server runs on background tasks.
pub async fn start<A>(config: ServerConfig, broker: Broker<A>) -> Result<ServerHandle, std::io::Error>
where
    A: Application + Send + 'static,
{
    let state = Arc::new(ServerState {
        broker: Mutex::new(broker),
        sessions: Mutex::new(SessionTable::new()),
    });

    let sweeper = tokio::spawn(run_sweeper(Arc::clone(&state), config.sweep_interval));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    log::info!("mudcast listening on {local_addr}");

    let router = build_router(state);
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            log::error!("server error: {e}");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server,
        _sweeper: sweeper,
    })
}

/// Periodically evict clients that stopped polling. Takes the broker lock
/// briefly per sweep, outside any client's request path.
async fn run_sweeper<A>(state: Arc<ServerState<A>>, interval: Duration)
where
    A: Application + Send + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // the first tick completes immediately
    loop {
        ticker.tick().await;
        let pruned = state.broker.lock().await.sweep_idle();
        if !pruned.is_empty() {
            log::info!("idle sweep pruned {} client(s)", pruned.len());
            state.sessions.lock().await.forget_pruned(&pruned);
        }
    }
}

/// `GET /` — serve the thin client and pin the session.
async fn index<A>(State(state): State<Arc<ServerState<A>>>, headers: HeaderMap) -> Response
where
    A: Application + Send + 'static,
{
    let (sid, fresh_cookie) = match cookie_sid(&headers) {
        Some(sid) => (sid, false),
        None => (Uuid::new_v4(), true),
    };

    let (key, newly_assigned) = state.sessions.lock().await.key_for(sid);
    if newly_assigned {
        state.broker.lock().await.register(&key);
    }

    let mut response = Html(INDEX_HTML).into_response();
    if fresh_cookie {
        let cookie = format!("sid={sid}; Path=/; HttpOnly; SameSite=Strict");
        response.headers_mut().append(
            header::SET_COOKIE,
            HeaderValue::from_str(&cookie).expect("cookie header value"),
        );
    }
    response
}

/// `POST /` — heartbeat and/or command submission.
///
/// Enqueue, tick and fetch run as one unit under the broker lock, so the
/// poller never observes a half-applied dispatch.
async fn poll<A>(
    State(state): State<Arc<ServerState<A>>>,
    headers: HeaderMap,
    Json(request): Json<PollRequest>,
) -> Response
where
    A: Application + Send + 'static,
{
    let Some(sid) = cookie_sid(&headers) else {
        return StatusCode::FORBIDDEN.into_response();
    };
    let Some(key) = state.sessions.lock().await.lookup(&sid) else {
        return StatusCode::FORBIDDEN.into_response();
    };

    let mut broker = state.broker.lock().await;
    if !request.command.is_empty() {
        if let Err(e) = broker.enqueue(&request.command, Some(&key)) {
            log::warn!("rejecting command from {key}: {e}");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }
    broker.tick();
    let messages = broker.fetch_since(&key, request.since);
    drop(broker);

    Json(PollResponse { messages }).into_response()
}

/// Extract the `sid` cookie, if present and well-formed.
fn cookie_sid(headers: &HeaderMap) -> Option<Uuid> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        if name == "sid" {
            Uuid::parse_str(value).ok()
        } else {
            None
        }
    })
}

/// The embedded thin client: an input buffer plus a polling loop that
/// doubles as the heartbeat keeping the broker ticking.
const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>mudcast</title></head>
<body>
<h1>mudcast</h1>
<div id="buffer"></div>
<p><input type="text" id="cmd" autofocus></p>
<script>
let last = 0;
async function poll(command) {
  const resp = await fetch("", {
    method: "POST",
    headers: {"Content-Type": "application/json"},
    body: JSON.stringify({command: command, since: last}),
  });
  if (!resp.ok) return;
  const data = await resp.json();
  for (const msg of data.messages) {
    const p = document.createElement("p");
    p.innerHTML = msg.body;
    document.getElementById("buffer").appendChild(p);
    last = msg.seq;
  }
}
document.getElementById("cmd").addEventListener("keydown", (e) => {
  if (e.key === "Enter") {
    poll(e.target.value);
    e.target.value = "";
  }
});
setInterval(() => poll(""), 5000);
</script>
</body>
</html>
"#;
