//! Integration test: serve the gateway router on a free port and talk to it over HTTP.
//! Collaborators are in-memory; nothing reaches Slack or a model backend. The server task is
//! left running when the test ends.

mod common;

use common::{dispatcher, history, MockGenerator, MockMessaging};
use lib::gateway::{self, GatewayState, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use std::sync::Arc;
use std::time::Duration;

const SECRET: &str = "test-signing-secret";

async fn start(signing_secret: Option<&str>) -> (String, Arc<MockMessaging>) {
    let messaging = Arc::new(MockMessaging::with_history(history()));
    let generator = Arc::new(MockGenerator::answering("Nothing unusual happened."));
    let d = dispatcher(Arc::clone(&messaging), generator);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind free port");
    let port = listener.local_addr().expect("local_addr").port();
    let state = GatewayState::new(Arc::new(d), signing_secret.map(str::to_string), port);
    tokio::spawn(async move {
        let _ = axum::serve(listener, gateway::router(state)).await;
    });
    (format!("http://127.0.0.1:{}", port), messaging)
}

async fn post_signed(
    client: &reqwest::Client,
    url: &str,
    content_type: &str,
    body: &'static [u8],
) -> reqwest::Response {
    let ts = chrono::Utc::now().timestamp().to_string();
    let signature = gateway::sign(SECRET, &ts, body).expect("sign");
    client
        .post(url)
        .header("Content-Type", content_type)
        .header(TIMESTAMP_HEADER, ts)
        .header(SIGNATURE_HEADER, signature)
        .body(body)
        .send()
        .await
        .expect("send")
}

#[tokio::test]
async fn gateway_health_http_responds_with_running() {
    let (base, _) = start(None).await;
    let url = format!("{}/", base);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let json: serde_json::Value = resp.json().await.expect("parse JSON");
                assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
                assert_eq!(json.get("dedupEntries").and_then(|v| v.as_u64()), Some(0));
                assert!(json.get("port").and_then(|v| v.as_u64()).is_some());
                return;
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "GET {} did not return 200 with health JSON within 5s; last error: {:?}",
        url, last_err
    );
}

#[tokio::test]
async fn handshake_echoes_challenge() {
    let (base, _) = start(Some(SECRET)).await;
    let client = reqwest::Client::new();
    let resp = post_signed(
        &client,
        &format!("{}/slack/events", base),
        "application/json",
        br#"{"type":"url_verification","challenge":"3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"}"#,
    )
    .await;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let json: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(
        json["challenge"],
        "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"
    );
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let (base, messaging) = start(Some(SECRET)).await;
    let client = reqwest::Client::new();
    let resp = post_signed(
        &client,
        &format!("{}/slack/events", base),
        "application/json",
        b"{\"type\": ",
    )
    .await;
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let json: serde_json::Value = resp.json().await.expect("json");
    assert!(json["error"]
        .as_str()
        .expect("error string")
        .starts_with("malformed payload"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(messaging.history_requests().is_empty());
    assert_eq!(messaging.delivery_attempts(), 0);
}

#[tokio::test]
async fn unsigned_request_is_rejected() {
    let (base, messaging) = start(Some(SECRET)).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/slack/events", base))
        .header("Content-Type", "application/json")
        .body(r#"{"type":"url_verification","challenge":"c"}"#)
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert!(messaging.history_requests().is_empty());
}

#[tokio::test]
async fn unknown_delivery_kind_is_acknowledged() {
    let (base, _) = start(None).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/slack/events", base))
        .header("Content-Type", "application/json")
        .body(r#"{"type":"app_rate_limited","minute_rate_limited":1518467820}"#)
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let json: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn retried_event_is_reported_as_duplicate() {
    let (base, messaging) = start(Some(SECRET)).await;
    let client = reqwest::Client::new();
    let url = format!("{}/slack/events", base);
    let body: &'static [u8] = br#"{"type":"event_callback","event_id":"Ev0HTTP","event":{
        "type":"app_mention","user":"U1","text":"<@UBOT> recap","ts":"1.0","channel":"C1"}}"#;

    let first: serde_json::Value = post_signed(&client, &url, "application/json", body)
        .await
        .json()
        .await
        .expect("json");
    assert_eq!(first, serde_json::json!({ "status": "ok" }));

    let second: serde_json::Value = post_signed(&client, &url, "application/json", body)
        .await
        .json()
        .await
        .expect("json");
    assert_eq!(second["message"], "duplicate");

    for _ in 0..100 {
        if !messaging.sent().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(messaging.sent().len(), 1);
}

#[tokio::test]
async fn slash_command_form_gets_ephemeral_ack() {
    let (base, messaging) = start(Some(SECRET)).await;
    let client = reqwest::Client::new();
    let resp = post_signed(
        &client,
        &format!("{}/slack/commands", base),
        "application/x-www-form-urlencoded",
        b"command=%2Fsummarize&text=&channel_id=C123&user_id=U9&response_url=https%3A%2F%2Fhooks.example%2Fx",
    )
    .await;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let json: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(json["response_type"], "ephemeral");
    assert!(json["text"].as_str().expect("text").contains("direct message"));

    for _ in 0..100 {
        if !messaging.sent().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let sent = messaging.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, "D-U9");
}
