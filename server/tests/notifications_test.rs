//! Integration tests for the personal notification channel and the
//! feedback-update ingress.

use chrono::{Duration as ChronoDuration, Utc};
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use relay_server::auth::jwt::issue_access_token;
use relay_server::db::models::Identity;
use relay_server::groups::{GroupBackend, GroupName, InProcessRegistry};
use relay_server::persistence::SqliteStore;
use relay_server::state::{AppState, SessionSettings};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

const SECRET: &[u8] = b"integration-test-secret-32-bytes";

struct TestServer {
    addr: SocketAddr,
    store: SqliteStore,
    registry: Arc<InProcessRegistry>,
    _tmp_dir: tempfile::TempDir,
}

async fn start_test_server() -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = relay_server::db::init_db(&data_dir).expect("Failed to init DB");
    let store = SqliteStore::new(db);
    let registry = Arc::new(InProcessRegistry::new());
    let state = AppState::new(
        SECRET,
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        registry.clone(),
        SessionSettings::default(),
    );

    let app = relay_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        addr,
        store,
        registry,
        _tmp_dir: tmp_dir,
    }
}

fn token_for(user: &Identity) -> String {
    issue_access_token(SECRET, user.id, Utc::now() + ChronoDuration::minutes(15)).unwrap()
}

/// Open a notification session and wait until the server has registered it.
async fn open_notifications(server: &TestServer, user: &Identity) -> WsStream {
    // Sample before connecting: the server may join the member before
    // connect_async returns.
    let group = GroupName::user(user.id);
    let expected = server.registry.member_count(&group) + 1;

    let url = format!(
        "ws://{}/ws/notifications/?token={}",
        server.addr,
        token_for(user)
    );
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("Failed to connect to WebSocket");

    for _ in 0..100 {
        if server.registry.member_count(&group) == expected {
            return ws;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Notification session for user {} never joined", user.id);
}

async fn next_text(ws: &mut WsStream, ms: u64) -> Option<Value> {
    loop {
        match tokio::time::timeout(Duration::from_millis(ms), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                return Some(serde_json::from_str(text.as_str()).expect("Invalid JSON frame"))
            }
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            _ => return None,
        }
    }
}

fn feedback_body(user_id: i64) -> Value {
    json!({
        "user_id": user_id,
        "feedback": {
            "id": 31,
            "status": "resolved",
            "admin_response": "Fixed in the latest build",
            "subject": "Crash on login",
            "message": "App crashes when I log in",
            "updated_at": "2026-10-01T12:00:00Z"
        }
    })
}

async fn post_update(
    server: &TestServer,
    token: Option<&str>,
    body: &Value,
) -> reqwest::StatusCode {
    let client = reqwest::Client::new();
    let mut req = client
        .post(format!("http://{}/api/internal/feedback-updates", server.addr))
        .json(body);
    if let Some(token) = token {
        req = req.header("Authorization", format!("Bearer {}", token));
    }
    req.send().await.unwrap().status()
}

#[tokio::test]
async fn test_feedback_update_reaches_owner_only() {
    let server = start_test_server().await;
    let staff = server.store.create_user("support", true, false).unwrap();
    let owner = server.store.create_user("owner", false, false).unwrap();
    let bystander = server.store.create_user("bystander", false, false).unwrap();

    let mut ws_owner = open_notifications(&server, &owner).await;
    let mut ws_other = open_notifications(&server, &bystander).await;

    let status = post_update(&server, Some(&token_for(&staff)), &feedback_body(owner.id)).await;
    assert_eq!(status, reqwest::StatusCode::ACCEPTED);

    let event = next_text(&mut ws_owner, 2000)
        .await
        .expect("Owner should receive the update");
    assert_eq!(event["type"], "feedback_update");
    assert_eq!(event["feedback"]["id"], 31);
    assert_eq!(event["feedback"]["status"], "resolved");
    assert_eq!(event["feedback"]["admin_response"], "Fixed in the latest build");

    assert!(next_text(&mut ws_other, 300).await.is_none());
}

#[tokio::test]
async fn test_feedback_update_reaches_every_device() {
    let server = start_test_server().await;
    let admin = server.store.create_user("root", false, true).unwrap();
    let owner = server.store.create_user("owner", false, false).unwrap();

    let mut phone = open_notifications(&server, &owner).await;
    let mut laptop = open_notifications(&server, &owner).await;
    assert_eq!(server.registry.member_count(&GroupName::user(owner.id)), 2);

    let status = post_update(&server, Some(&token_for(&admin)), &feedback_body(owner.id)).await;
    assert_eq!(status, reqwest::StatusCode::ACCEPTED);

    for ws in [&mut phone, &mut laptop] {
        let event = next_text(ws, 2000).await.expect("Every device should receive the update");
        assert_eq!(event["type"], "feedback_update");
    }
}

#[tokio::test]
async fn test_feedback_ingress_requires_staff_token() {
    let server = start_test_server().await;
    let regular = server.store.create_user("regular", false, false).unwrap();
    let body = feedback_body(regular.id);

    assert_eq!(
        post_update(&server, None, &body).await,
        reqwest::StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        post_update(&server, Some("garbage"), &body).await,
        reqwest::StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        post_update(&server, Some(&token_for(&regular)), &body).await,
        reqwest::StatusCode::FORBIDDEN
    );
}

#[tokio::test]
async fn test_update_without_session_is_dropped() {
    let server = start_test_server().await;
    let staff = server.store.create_user("support", true, false).unwrap();
    let offline = server.store.create_user("offline", false, false).unwrap();

    let status = post_update(&server, Some(&token_for(&staff)), &feedback_body(offline.id)).await;
    assert_eq!(status, reqwest::StatusCode::ACCEPTED);
    assert_eq!(server.registry.group_count(), 0);
}

#[tokio::test]
async fn test_notification_session_leaves_group_on_close() {
    let server = start_test_server().await;
    let owner = server.store.create_user("owner", false, false).unwrap();
    let group = GroupName::user(owner.id);

    let mut ws = open_notifications(&server, &owner).await;
    ws.close(None).await.unwrap();

    for _ in 0..100 {
        if server.registry.member_count(&group) == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Notification session was not removed after close");
}

#[tokio::test]
async fn test_notifications_reject_missing_token() {
    let server = start_test_server().await;
    let url = format!("ws://{}/ws/notifications", server.addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("Expected close message within timeout");
    match msg {
        Some(Ok(Message::Close(Some(frame)))) => assert_eq!(u16::from(frame.code), 4002),
        other => panic!("Expected close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_health() {
    let server = start_test_server().await;
    let body = reqwest::get(format!("http://{}/health", server.addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");
}
