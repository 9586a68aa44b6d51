//! HTTP bridge in front of the stdio server.
//!
//! Re-exposes the child process over three surfaces: a `/health` probe, a
//! plain `POST /mcp` JSON-RPC forwarder, and an SSE session pair
//! (`GET /sse` + `POST /messages/`) shaped the way FastMCP servers
//! negotiate sessions.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use axum::extract::{Query, Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use crate::backend::{Backend, Pipe};
use crate::config::Config;
use crate::rpc::RpcError;
use crate::Result;

/// Handle to whichever [`Pipe`] is currently live. Swapped out by the
/// supervisor across child restarts.
#[derive(Default)]
pub struct SharedPipe {
    inner: RwLock<Option<Arc<Pipe>>>,
}

impl SharedPipe {
    pub fn install(&self, pipe: Arc<Pipe>) {
        *self.inner.write().unwrap() = Some(pipe);
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap() = None;
    }

    pub fn current(&self) -> Option<Arc<Pipe>> {
        self.inner.read().unwrap().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.current().is_some_and(|pipe| pipe.is_ready())
    }
}

/// Open SSE sessions, keyed by the session id negotiated on `GET /sse`.
#[derive(Default)]
pub struct SseSessions {
    sessions: Mutex<HashMap<uuid::Uuid, mpsc::Sender<Event>>>,
}

impl SseSessions {
    /// Create a session and queue its `endpoint` negotiation event.
    pub fn open(&self) -> (uuid::Uuid, mpsc::Receiver<Event>) {
        let id = uuid::Uuid::new_v4();
        let (tx, rx) = mpsc::channel(16);

        let endpoint = Event::default()
            .event("endpoint")
            .data(format!("/messages/?session_id={id}"));
        // Capacity is fresh, the first send cannot fail.
        let _ = tx.try_send(endpoint);

        self.sessions.lock().unwrap().insert(id, tx);
        (id, rx)
    }

    pub fn contains(&self, id: &uuid::Uuid) -> bool {
        self.sessions.lock().unwrap().contains_key(id)
    }

    /// Deliver an event to a session; a gone receiver closes the session.
    pub async fn send(&self, id: &uuid::Uuid, event: Event) -> bool {
        let tx = self.sessions.lock().unwrap().get(id).cloned();
        let Some(tx) = tx else {
            return false;
        };
        if tx.send(event).await.is_err() {
            self.sessions.lock().unwrap().remove(id);
            return false;
        }
        true
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pipe: Arc<SharedPipe>,
    pub sessions: Arc<SseSessions>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            pipe: Arc::new(SharedPipe::default()),
            sessions: Arc::new(SseSessions::default()),
            request_timeout,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/mcp", post(forward_rpc))
        .route("/sse", get(open_sse))
        .route("/messages", post(post_message))
        .route("/messages/", post(post_message))
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

/// Run the bridge: supervise the child process and serve HTTP until
/// interrupted.
pub async fn serve(config: Config) -> Result<()> {
    let state = AppState::new(config.request_timeout);
    let socket = config.bind_socket()?;

    tokio::spawn(supervise(config, state.clone()));

    let listener = tokio::net::TcpListener::bind(socket).await?;
    info!(
        mcp = %format!("http://{socket}/mcp"),
        health = %format!("http://{socket}/health"),
        sse = %format!("http://{socket}/sse"),
        "bridge listening"
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}

/// Keep the child process alive: connect, publish its pipe, wait for it
/// to die, then respawn after the configured delay.
pub async fn supervise(config: Config, state: AppState) {
    loop {
        match Backend::connect(&config).await {
            Ok(backend) => {
                state.pipe.install(backend.pipe());
                let status = backend.wait().await;
                warn!(status = ?status.ok(), "MCP server exited");
                state.pipe.clear();
            }
            Err(err) => {
                error!(error = %err, "failed to start MCP server");
            }
        }
        info!(delay = ?config.restart_delay, "restarting MCP server");
        tokio::time::sleep(config.restart_delay).await;
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "mcpServerReady": state.pipe.is_ready(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn forward_rpc(State(state): State<AppState>, Json(body): Json<Value>) -> HttpResponse {
    let Some(method) = body["method"].as_str().map(str::to_string) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Method is required" })),
        )
            .into_response();
    };

    let Some(pipe) = state.pipe.current().filter(|pipe| pipe.is_ready()) else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "MCP server not ready" })),
        )
            .into_response();
    };

    let params = body.get("params").cloned();
    match pipe.request_raw(&method, params, state.request_timeout).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": format!("Failed to communicate with MCP server: {err}")
            })),
        )
            .into_response(),
    }
}

async fn open_sse(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (id, rx) = state.sessions.open();
    info!(session_id = %id, "SSE session opened");

    let stream = ReceiverStream::new(rx).map(Ok);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

#[derive(Deserialize)]
struct MessageParams {
    session_id: uuid::Uuid,
}

async fn post_message(
    State(state): State<AppState>,
    Query(params): Query<MessageParams>,
    Json(body): Json<Value>,
) -> HttpResponse {
    if !state.sessions.contains(&params.session_id) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Unknown session" })),
        )
            .into_response();
    }

    let Some(method) = body["method"].as_str().map(str::to_string) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Method is required" })),
        )
            .into_response();
    };

    // Notifications carry no id and get no reply event.
    let client_id = body.get("id").cloned();
    let rpc_params = body.get("params").cloned();
    let session_id = params.session_id;

    tokio::spawn(async move {
        let Some(id) = client_id else {
            if let Some(pipe) = state.pipe.current() {
                let notification = crate::rpc::Notification::new(method, rpc_params);
                let _ = pipe.notify(&notification).await;
            }
            return;
        };

        let payload = dispatch(&state, &method, rpc_params, id).await;
        let event = Event::default().event("message").data(payload.to_string());
        if !state.sessions.send(&session_id, event).await {
            warn!(session_id = %session_id, "SSE session gone, dropping reply");
        }
    });

    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))).into_response()
}

/// Forward one JSON-RPC request and shape the reply with the caller's id.
pub(crate) async fn dispatch(
    state: &AppState,
    method: &str,
    params: Option<Value>,
    id: Value,
) -> Value {
    let Some(pipe) = state.pipe.current().filter(|pipe| pipe.is_ready()) else {
        return error_reply(&id, -32000, "MCP server not ready");
    };

    match pipe.request_raw(method, params, state.request_timeout).await {
        Ok(mut response) => {
            response.id = Some(id);
            serde_json::to_value(&response).unwrap_or(Value::Null)
        }
        Err(err) => error_reply(&id, -32603, &err.to_string()),
    }
}

fn error_reply(id: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": RpcError {
            code,
            message: message.to_string(),
            data: None,
        },
    })
}

/// Permissive CORS, matching the node wrapper's headers.
async fn cors(request: Request, next: Next) -> HttpResponse {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}
