use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use super::quiet_server;
use crate::bridge::{AppState, build_router, dispatch};

fn state() -> AppState {
    AppState::new(Duration::from_secs(2))
}

async fn ready_state() -> AppState {
    let state = state();
    let (pipe, _fake) = quiet_server();
    pipe.initialize(Duration::from_secs(5)).await.unwrap();
    state.pipe.install(Arc::new(pipe));
    state
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_backend_state() {
    let app = build_router(state());
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["mcpServerReady"], false);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn mcp_requires_a_method() {
    let app = build_router(ready_state().await);
    let response = app
        .oneshot(post_json("/mcp", json!({ "params": {} })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Method is required");
}

#[tokio::test]
async fn mcp_rejects_requests_before_ready() {
    let app = build_router(state());
    let response = app
        .oneshot(post_json("/mcp", json!({ "method": "tools/list", "params": {} })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"], "MCP server not ready");
}

#[tokio::test]
async fn mcp_forwards_to_the_backend() {
    let app = build_router(ready_state().await);
    let response = app
        .oneshot(post_json("/mcp", json!({ "method": "tools/list", "params": {} })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["result"]["tools"][0]["name"], "execute_sql");
}

#[tokio::test]
async fn mcp_surfaces_backend_errors() {
    let app = build_router(ready_state().await);
    let response = app
        .oneshot(post_json("/mcp", json!({ "method": "no/such/method" })))
        .await
        .unwrap();

    // JSON-RPC errors come back verbatim inside a 200.
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32601);
}

#[tokio::test]
async fn cors_headers_are_set() {
    let app = build_router(state());
    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/mcp")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
}

#[tokio::test]
async fn sse_negotiation_returns_an_event_stream() {
    let app = build_router(state());
    let response = app
        .oneshot(Request::get("/sse").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
    assert_eq!(content_type, "text/event-stream");

    // Only read the first frame: the stream itself stays open.
    let mut body = response.into_body();
    let frame = body.frame().await.unwrap().unwrap();
    let data = frame.into_data().unwrap();
    let text = String::from_utf8(data.to_vec()).unwrap();
    assert!(text.contains("event: endpoint"));
    assert!(text.contains("/messages/?session_id="));
}

#[tokio::test]
async fn messages_rejects_unknown_sessions() {
    let app = build_router(state());
    let uri = format!("/messages/?session_id={}", uuid::Uuid::new_v4());
    let response = app
        .oneshot(post_json(&uri, json!({ "method": "tools/list", "id": 1 })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn messages_accepts_and_replies_on_the_stream() {
    let state = ready_state().await;
    let (session_id, mut rx) = state.sessions.open();

    let app = build_router(state);
    let uri = format!("/messages/?session_id={session_id}");
    let response = app
        .oneshot(post_json(
            &uri,
            json!({ "jsonrpc": "2.0", "id": 42, "method": "tools/list", "params": {} }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // First the negotiation event, then the reply.
    let endpoint = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap();
    assert!(endpoint.is_some());
    let reply = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap();
    assert!(reply.is_some());
}

#[tokio::test]
async fn dispatch_restores_the_client_id() {
    let state = ready_state().await;
    let reply = dispatch(&state, "tools/list", Some(json!({})), json!(42)).await;

    assert_eq!(reply["id"], 42);
    assert_eq!(reply["result"]["tools"][0]["name"], "execute_sql");
}

#[tokio::test]
async fn dispatch_reports_not_ready() {
    let state = state();
    let reply = dispatch(&state, "tools/list", Some(json!({})), json!(1)).await;

    assert_eq!(reply["id"], 1);
    assert_eq!(reply["error"]["code"], -32000);
    assert_eq!(reply["error"]["message"], "MCP server not ready");
}
