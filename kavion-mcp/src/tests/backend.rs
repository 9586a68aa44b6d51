use std::time::Duration;

use serde_json::json;

use super::{quiet_server, ready_server, wait_until};
use crate::Error;

#[tokio::test]
async fn initialize_handshake_marks_ready() {
    let (pipe, fake) = quiet_server();
    assert!(!pipe.is_ready());

    let info = pipe.initialize(Duration::from_secs(5)).await.unwrap();
    assert_eq!(info["serverInfo"]["name"], "kavion-fake");
    assert!(pipe.is_ready());

    // The handshake ends with the initialized notification.
    wait_until(|| fake.saw_method("notifications/initialized")).await;
}

#[tokio::test]
async fn ready_banner_marks_ready_without_handshake() {
    let (pipe, _fake) = ready_server();
    pipe.wait_ready(Duration::from_secs(5)).await.unwrap();
    assert!(pipe.is_ready());
}

#[tokio::test]
async fn wait_ready_times_out_on_silent_server() {
    let (pipe, _fake) = quiet_server();
    let err = pipe.wait_ready(Duration::from_millis(100)).await.unwrap_err();
    assert!(matches!(err, Error::NotReady));
}

#[tokio::test]
async fn tools_call_round_trip() {
    let (pipe, _fake) = quiet_server();
    pipe.initialize(Duration::from_secs(5)).await.unwrap();

    let result = pipe
        .request(
            "tools/call",
            Some(json!({ "name": "execute_sql", "arguments": { "query": "SELECT 1" } })),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert_eq!(result["content"][0]["text"], "called execute_sql");
}

#[tokio::test]
async fn server_error_is_surfaced() {
    let (pipe, _fake) = quiet_server();
    pipe.initialize(Duration::from_secs(5)).await.unwrap();

    let err = pipe
        .request("no/such/method", Some(json!({})), Duration::from_secs(5))
        .await
        .unwrap_err();

    match err {
        Error::Rpc(rpc) => assert_eq!(rpc.code, -32601),
        other => panic!("expected an RPC error, got {other:?}"),
    }
}

#[tokio::test]
async fn unanswered_request_times_out() {
    let (pipe, _fake) = quiet_server();
    pipe.initialize(Duration::from_secs(5)).await.unwrap();

    let err = pipe
        .request(
            "tools/call",
            Some(json!({ "name": "sleepy", "arguments": {} })),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(_)));
}

#[tokio::test]
async fn response_under_wrong_id_is_dropped() {
    let (pipe, _fake) = quiet_server();
    pipe.initialize(Duration::from_secs(5)).await.unwrap();

    // The misdirected reply must not complete this request.
    let err = pipe
        .request(
            "tools/call",
            Some(json!({ "name": "confused", "arguments": {} })),
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));

    // The pipe keeps working afterwards.
    let result = pipe
        .request(
            "tools/call",
            Some(json!({ "name": "execute_sql", "arguments": {} })),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(result["content"][0]["text"], "called execute_sql");
}

#[tokio::test]
async fn server_exit_drops_readiness_and_fails_requests() {
    let (pipe, _fake) = quiet_server();
    pipe.initialize(Duration::from_secs(5)).await.unwrap();
    assert!(pipe.is_ready());

    // The fake hangs up on this method.
    let _ = pipe
        .request("crash", None, Duration::from_millis(200))
        .await;

    wait_until(|| !pipe.is_ready()).await;

    let err = pipe
        .request("tools/list", Some(json!({})), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ServerGone));
}
