//! Spawns the compiled daemon as a subprocess and drives its WebSocket
//! surface through a real `tokio-tungstenite` client, exercising the
//! inbound command grammar end to end rather than wiring the Hub up
//! in-process.

use anyhow::Result;
use serde_json::{json, Value};
use serial_test::serial;
use std::process::{Child, Command};
use std::time::Duration;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use futures_util::{SinkExt, StreamExt};

const TEST_BIND: &str = "127.0.0.1:18181";
const STARTUP_POLL_ATTEMPTS: u32 = 20;
const STARTUP_POLL_DELAY: Duration = Duration::from_millis(200);

struct TestServer {
    process: Child,
}

impl TestServer {
    async fn start() -> Result<Self> {
        let process = Command::new(env!("CARGO_BIN_EXE_gesture-streamd"))
            .args([
                "--bind",
                TEST_BIND,
                "--test-pattern",
                "--config",
                "tests/fixtures/nonexistent_config.toml",
            ])
            .spawn()?;

        let server = TestServer { process };
        if !server.is_ready().await {
            panic!("server at {TEST_BIND} did not become ready in time");
        }
        Ok(server)
    }

    async fn is_ready(&self) -> bool {
        let client = reqwest::Client::new();
        for _ in 0..STARTUP_POLL_ATTEMPTS {
            if let Ok(resp) = client
                .get(format!("http://{TEST_BIND}/health"))
                .timeout(Duration::from_secs(1))
                .send()
                .await
            {
                if resp.status().is_success() {
                    return true;
                }
            }
            sleep(STARTUP_POLL_DELAY).await;
        }
        false
    }

    fn ws_url(&self) -> String {
        format!("ws://{TEST_BIND}/ws")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

// `--config tests/fixtures/nonexistent_config.toml` deliberately points at a
// file that doesn't exist; `Config::load` falls back to `Config::default()`
// on any load error, so every test below runs against the stock default
// configuration (finger_count/volume_control/virtual_mouse registered,
// finger_count active) without needing a fixture file on disk.

#[tokio::test]
#[serial]
async fn ping_pong_round_trip_over_real_socket() -> Result<()> {
    let server = TestServer::start().await?;
    let (ws, _) = connect_async(server.ws_url()).await.expect("connect");
    let (mut write, mut read) = ws.split();

    let welcome = read.next().await.unwrap().unwrap();
    let welcome: Value = serde_json::from_str(welcome.to_text().unwrap()).unwrap();
    assert_eq!(welcome["type"], "connected");

    write
        .send(Message::Text(json!({"command": "ping"}).to_string()))
        .await
        .unwrap();
    let pong = read.next().await.unwrap().unwrap();
    let pong: Value = serde_json::from_str(pong.to_text().unwrap()).unwrap();
    assert_eq!(pong["type"], "pong");

    Ok(())
}

#[tokio::test]
#[serial]
async fn subscribe_to_unregistered_project_is_rejected() -> Result<()> {
    let server = TestServer::start().await?;
    let (ws, _) = connect_async(server.ws_url()).await.expect("connect");
    let (mut write, mut read) = ws.split();
    let _welcome = read.next().await.unwrap().unwrap();

    write
        .send(Message::Text(
            json!({"command": "subscribe", "project": "not_a_real_project"}).to_string(),
        ))
        .await
        .unwrap();
    let response = read.next().await.unwrap().unwrap();
    let response: Value = serde_json::from_str(response.to_text().unwrap()).unwrap();
    assert_eq!(response["type"], "error");
    assert_eq!(response["code"], "project_not_found");

    Ok(())
}

#[tokio::test]
#[serial]
async fn subscribed_session_receives_gesture_data_for_registered_project() -> Result<()> {
    let server = TestServer::start().await?;
    let (ws, _) = connect_async(server.ws_url()).await.expect("connect");
    let (mut write, mut read) = ws.split();
    let _welcome = read.next().await.unwrap().unwrap();

    write
        .send(Message::Text(
            json!({"command": "subscribe", "project": "finger_count"}).to_string(),
        ))
        .await
        .unwrap();
    let subscribed = read.next().await.unwrap().unwrap();
    let subscribed: Value = serde_json::from_str(subscribed.to_text().unwrap()).unwrap();
    assert_eq!(subscribed["type"], "subscribed");

    // The test-pattern capture backend feeds a flat gray frame through the
    // real pipeline continuously, so gesture_data should show up without
    // any extra stimulus.
    let pushed = tokio::time::timeout(Duration::from_secs(5), read.next())
        .await
        .expect("timed out waiting for gesture_data")
        .unwrap()
        .unwrap();
    let pushed: Value = serde_json::from_str(pushed.to_text().unwrap()).unwrap();
    assert_eq!(pushed["type"], "gesture_data");
    assert_eq!(pushed["project"], "finger_count");

    Ok(())
}
