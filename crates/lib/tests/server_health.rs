//! Integration tests: start the server on a free port, GET /api/health, assert
//! the health JSON. Does not require Telegram or a running VOI API. The server
//! task is left running when each test ends.

use lib::config::{self, Config};
use lib::server;
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

/// Spawn run_server with the given config and GET /api/health until it responds.
async fn fetch_health(config: Config) -> (reqwest::Response, String) {
    let port = config.server.port;
    tokio::spawn(async move {
        let _ = server::run_server(config).await;
    });

    let url = format!("http://127.0.0.1:{}/api/health", port);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => return (resp, url),
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "GET {} did not return 200 within 5s; last error: {:?}",
        url, last_err
    );
}

#[tokio::test]
async fn health_reports_inactive_bot_without_token() {
    if std::env::var("TELEGRAM_BOT_TOKEN").is_ok() {
        return;
    }
    let mut config = Config::default();
    config.server.port = free_port();
    let expected_url = config::resolve_voi_api_url(&config);

    let (resp, url) = fetch_health(config).await;
    let json: serde_json::Value = resp.json().await.expect("parse JSON");
    assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("ok"));
    assert_eq!(json.get("botActive").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        json.get("voiApiUrl").and_then(|v| v.as_str()),
        Some(expected_url.as_str())
    );

    // Idempotence: repeated calls return byte-identical bodies.
    let client = reqwest::Client::new();
    let first = client.get(&url).send().await.expect("first").bytes().await.expect("bytes");
    let second = client.get(&url).send().await.expect("second").bytes().await.expect("bytes");
    assert_eq!(first, second);
}

#[tokio::test]
async fn health_reports_active_bot_with_token() {
    let mut config = Config::default();
    config.server.port = free_port();
    config.channels.telegram.bot_token = Some("0000:test-token".to_string());
    // Webhook mode so the connector makes one (failing) registration attempt
    // instead of starting a long-poll loop.
    config.channels.telegram.webhook_url = Some("https://example.invalid/telegram/webhook".to_string());

    let (resp, _url) = fetch_health(config).await;
    let json: serde_json::Value = resp.json().await.expect("parse JSON");
    assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("ok"));
    assert_eq!(json.get("botActive").and_then(|v| v.as_bool()), Some(true));
}
