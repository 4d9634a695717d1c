//! HTTP surface tests over a loopback listener.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;

use vesper::config::AppConfig;
use vesper::events::{EventBus, EventType};
use vesper::memory::MemoryStore;
use vesper::routes;
use vesper::state::AppState;

struct TestServer {
    base: String,
    state: AppState,
    _dir: tempfile::TempDir,
}

async fn serve() -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let config_path: PathBuf = dir.path().join("config.yaml");
    let mut config = AppConfig::default();
    config.api_key = "sk-secret".into();
    config.memory_path = dir.path().join("memories.json");
    config.logs_dir = dir.path().join("logs");
    std::fs::create_dir_all(&config.logs_dir).unwrap();

    let memory = Arc::new(
        MemoryStore::load(config.memory_path.clone(), 16, None)
            .await
            .unwrap(),
    );
    let state = AppState::new(config, config_path, memory, EventBus::new());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = routes::router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestServer {
        base: format!("http://{addr}"),
        state,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_get_settings_redacts_api_key() {
    let server = serve().await;
    let settings: serde_json::Value = reqwest::get(format!(
        "{}/api/Configuration/GetSettings",
        server.base
    ))
    .await
    .unwrap()
    .json()
    .await
    .unwrap();

    assert_eq!(settings["apiKey"], "********");
    assert_eq!(settings["model"], "gpt-realtime");
}

#[tokio::test]
async fn test_get_schema_contains_enums() {
    let server = serve().await;
    let schema: serde_json::Value =
        reqwest::get(format!("{}/api/Configuration/GetSchema", server.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

    assert_eq!(schema["title"], "AppConfig");
    assert!(schema["properties"]["model"]["enum"].is_array());
}

#[tokio::test]
async fn test_update_settings_persists_and_publishes() {
    let server = serve().await;
    let mut rx = server.state.bus.watch(&[EventType::ConfigChanged]);

    let mut updated = server.state.config_snapshot();
    updated.startup_volume = 2;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/Configuration/UpdateSettings", server.base))
        .json(&updated)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    // ConfigChanged went out on the bus.
    assert!(rx.recv().await.is_some());
    // The live config changed and the redacted key was not clobbered.
    let config = server.state.config_snapshot();
    assert_eq!(config.startup_volume, 2);
    assert_eq!(config.api_key, "sk-secret");
    // And the file was rewritten.
    let persisted = AppConfig::load(&server.state.config_path).unwrap();
    assert_eq!(persisted.startup_volume, 2);
}

#[tokio::test]
async fn test_update_settings_rejects_invalid_config() {
    let server = serve().await;
    let mut broken = server.state.config_snapshot();
    broken.agents[0].wake_word_threshold = 5.0;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/Configuration/UpdateSettings", server.base))
        .json(&broken)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_memory_rest_round_trip() {
    let server = serve().await;
    let client = reqwest::Client::new();

    // PUT
    let response = client
        .put(format!("{}/api/Memory/owner-name", server.base))
        .json(&serde_json::json!({ "content": "Ada" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    // GET one
    let item: serde_json::Value = client
        .get(format!("{}/api/Memory/owner-name", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(item["content"], "Ada");

    // List + stats
    let list: serde_json::Value = client
        .get(format!("{}/api/Memory", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);
    let stats: serde_json::Value = client
        .get(format!("{}/api/Memory/stats", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["count"], 1);

    // Search without an embedder is empty, not an error.
    let hits: serde_json::Value = client
        .get(format!("{}/api/Memory/search?query=ada", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 0);

    // DELETE
    let response = client
        .delete(format!("{}/api/Memory/owner-name", server.base))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let response = client
        .get(format!("{}/api/Memory/owner-name", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_memory_clear() {
    let server = serve().await;
    let client = reqwest::Client::new();
    for key in ["a", "b", "c"] {
        client
            .put(format!("{}/api/Memory/{key}", server.base))
            .json(&serde_json::json!({ "content": "x" }))
            .send()
            .await
            .unwrap();
    }

    client
        .delete(format!("{}/api/Memory/clear", server.base))
        .send()
        .await
        .unwrap();

    let list: serde_json::Value = client
        .get(format!("{}/api/Memory", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_get_logs_tail_and_rotation() {
    let server = serve().await;
    let logs_dir = server.state.logs_dir.clone();
    std::fs::write(logs_dir.join("vesper.log.2026-08-01"), "one\ntwo\n").unwrap();

    let client = reqwest::Client::new();
    let tail: serde_json::Value = client
        .get(format!("{}/api/System/GetLogs", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tail["fileName"], "vesper.log.2026-08-01");
    assert_eq!(tail["lines"].as_array().unwrap().len(), 2);
    assert_eq!(tail["hasNewLines"], true);
    let position = tail["newPosition"].as_u64().unwrap();

    // Nothing new at the same position.
    let tail: serde_json::Value = client
        .get(format!(
            "{}/api/System/GetLogs?lastPosition={position}&lastFile=vesper.log.2026-08-01",
            server.base
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tail["hasNewLines"], false);
    assert_eq!(tail["fileChanged"], false);

    // A rotated file restarts from zero.
    std::fs::write(logs_dir.join("vesper.log.2026-08-02"), "three\n").unwrap();
    let tail: serde_json::Value = client
        .get(format!(
            "{}/api/System/GetLogs?lastPosition={position}&lastFile=vesper.log.2026-08-01",
            server.base
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tail["fileChanged"], true);
    assert_eq!(tail["fileName"], "vesper.log.2026-08-02");
    assert_eq!(tail["lines"].as_array().unwrap()[0], "three");
}
