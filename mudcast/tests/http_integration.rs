//! End-to-end tests through the HTTP polling transport: real server, real
//! clients, cookie-pinned sessions, JSON protocol.

use std::time::Duration;

use mudcast::broker::{Broker, BrokerConfig};
use mudcast::chatroom::Chatroom;
use mudcast::server::{self, ServerConfig};

/// Start a chat room server on a free port, return its base url.
async fn start_test_server() -> String {
    start_test_server_with(BrokerConfig::default(), Duration::from_secs(60)).await
}

async fn start_test_server_with(broker_config: BrokerConfig, sweep: Duration) -> String {
    let broker = Broker::new(Chatroom::new(), broker_config);
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        sweep_interval: sweep,
    };
    let handle = server::start(config, broker).await.unwrap();
    format!("http://127.0.0.1:{}", handle.port)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .unwrap()
}

async fn poll(
    client: &reqwest::Client,
    url: &str,
    command: &str,
    since: u64,
) -> (reqwest::StatusCode, Vec<(u64, String)>) {
    let resp = client
        .post(url)
        .json(&serde_json::json!({ "command": command, "since": since }))
        .send()
        .await
        .unwrap();
    let status = resp.status();
    if !status.is_success() {
        return (status, Vec::new());
    }
    let body: serde_json::Value = resp.json().await.unwrap();
    let messages = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| {
            (
                m["seq"].as_u64().unwrap(),
                m["body"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    (status, messages)
}

#[tokio::test]
async fn test_get_serves_page_and_issues_cookie() {
    let url = start_test_server().await;
    let client = client();

    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().contains_key("set-cookie"));
    let page = resp.text().await.unwrap();
    assert!(page.contains("mudcast"));
    assert!(page.contains("setInterval"));

    // A revisit with the cookie does not issue a second one.
    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(!resp.headers().contains_key("set-cookie"));
}

#[tokio::test]
async fn test_poll_without_session_is_forbidden() {
    let url = start_test_server().await;
    let client = client();

    // Never visited the page: no cookie, no key.
    let (status, _) = poll(&client, &url, "", 0).await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn test_first_poll_returns_welcome() {
    let url = start_test_server().await;
    let client = client();
    client.get(&url).send().await.unwrap();

    let (status, messages) = poll(&client, &url, "", 0).await;
    assert_eq!(status, 200);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].1.starts_with("Welcome!"));
}

#[tokio::test]
async fn test_connect_round_trip() {
    let url = start_test_server().await;
    let client = client();
    client.get(&url).send().await.unwrap();

    let (_, welcome) = poll(&client, &url, "", 0).await;
    let watermark = welcome.last().unwrap().0;

    // Enqueue + tick + fetch happen in one request, so the reply to the
    // connect command arrives in the same response.
    let (status, messages) = poll(&client, &url, "connect alice", watermark).await;
    assert_eq!(status, 200);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].1, "Welcome, alice!");
}

#[tokio::test]
async fn test_two_clients_chat() {
    let url = start_test_server().await;
    let alice = client();
    let bob = client();

    alice.get(&url).send().await.unwrap();
    bob.get(&url).send().await.unwrap();

    let (_, msgs) = poll(&alice, &url, "", 0).await;
    let mut alice_mark = msgs.last().unwrap().0;
    let (_, msgs) = poll(&bob, &url, "", 0).await;
    let mut bob_mark = msgs.last().unwrap().0;

    let (_, msgs) = poll(&alice, &url, "connect alice", alice_mark).await;
    alice_mark = msgs.last().unwrap().0;
    let (_, msgs) = poll(&bob, &url, "connect bob", bob_mark).await;
    bob_mark = msgs.last().unwrap().0;

    let (_, msgs) = poll(&alice, &url, "hello there", alice_mark).await;
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].1, "You say 'hello there'");

    // Bob's next heartbeat picks up the relay.
    let (_, msgs) = poll(&bob, &url, "", bob_mark).await;
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].1, "alice says 'hello there'");
    bob_mark = msgs.last().unwrap().0;

    // Watermarks only move forward: replaying the old one re-reads,
    // the new one reads nothing.
    let (_, replay) = poll(&bob, &url, "", 0).await;
    assert!(replay.len() >= 2);
    let (_, nothing) = poll(&bob, &url, "", bob_mark).await;
    assert!(nothing.is_empty());
}

#[tokio::test]
async fn test_queue_ceiling_maps_to_service_unavailable() {
    let url = start_test_server_with(
        BrokerConfig {
            queue_depth: 1,
            // A zero budget parks entries in the queue instead of
            // dispatching them, so the ceiling is reachable.
            tick_budget: Duration::from_secs(0),
            ..BrokerConfig::default()
        },
        Duration::from_secs(60),
    )
    .await;
    let client = client();
    client.get(&url).send().await.unwrap();

    let (status, _) = poll(&client, &url, "connect alice", 0).await;
    assert_eq!(status, 200);
    let (status, _) = poll(&client, &url, "hello", 0).await;
    assert_eq!(status, 503);
}

#[tokio::test]
async fn test_idle_sweeper_evicts_silent_sessions() {
    let url = start_test_server_with(
        BrokerConfig {
            idle_timeout: Duration::from_millis(50),
            ..BrokerConfig::default()
        },
        Duration::from_millis(25),
    )
    .await;
    let client = client();
    client.get(&url).send().await.unwrap();
    let (_, welcome) = poll(&client, &url, "", 0).await;
    assert_eq!(welcome.len(), 1);

    // Stay silent long enough for the sweeper to prune the session.
    tokio::time::sleep(Duration::from_millis(150)).await;

    // The stale cookie no longer maps to a key.
    let (status, _) = poll(&client, &url, "", 0).await;
    assert_eq!(status, 403);

    // Re-visiting the page re-registers under a fresh key.
    client.get(&url).send().await.unwrap();
    let (status, messages) = poll(&client, &url, "", 0).await;
    assert_eq!(status, 200);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].1.starts_with("Welcome!"));
}
