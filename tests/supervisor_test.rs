//! Supervisor agent-cache behaviour: reuse, session aging, disposal.
//! (The full wake→run cycle needs audio hardware; the cache logic does
//! not.)

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use vesper::config::AppConfig;
use vesper::device::{LogMixerBackend, VolumeMixer};
use vesper::events::EventBus;
use vesper::memory::MemoryStore;
use vesper::state::AppState;
use vesper::supervisor::Supervisor;

async fn supervisor_with(config: AppConfig) -> (Supervisor, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let memory = Arc::new(
        MemoryStore::load(dir.path().join("memories.json"), 16, None)
            .await
            .unwrap(),
    );
    let state = AppState::new(
        config,
        dir.path().join("config.yaml"),
        memory,
        EventBus::new(),
    );
    let mixer = Arc::new(VolumeMixer::new(Arc::new(LogMixerBackend)));
    (
        Supervisor::new(state, mixer, CancellationToken::new()),
        dir,
    )
}

#[tokio::test]
async fn test_agent_is_reused_within_session_timeout() {
    let config = AppConfig::default();
    let (supervisor, _dir) = supervisor_with(config.clone()).await;
    let agent_config = config.agents[0].clone();

    let first = supervisor.get_or_create_agent(&config, &agent_config).await;
    let second = supervisor.get_or_create_agent(&config, &agent_config).await;
    assert!(Arc::ptr_eq(&first, &second));
    assert!(supervisor.has_cached_agents().await);
}

// Session aging: an expired agent is disposed and replaced before the
// next run.
#[tokio::test]
async fn test_expired_agent_is_recreated() {
    let mut config = AppConfig::default();
    // Zero-minute timeout: every cached session counts as expired.
    config.session_timeout_minutes = 0;
    let (supervisor, _dir) = supervisor_with(config.clone()).await;
    let agent_config = config.agents[0].clone();

    let first = supervisor.get_or_create_agent(&config, &agent_config).await;
    let second = supervisor.get_or_create_agent(&config, &agent_config).await;
    assert!(!Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_dispose_all_empties_the_cache() {
    let config = AppConfig::default();
    let (supervisor, _dir) = supervisor_with(config.clone()).await;
    let agent_config = config.agents[0].clone();

    supervisor.get_or_create_agent(&config, &agent_config).await;
    assert!(supervisor.has_cached_agents().await);

    supervisor.dispose_all_agents().await;
    assert!(!supervisor.has_cached_agents().await);
}

#[tokio::test]
async fn test_agents_are_cached_per_name() {
    let mut config = AppConfig::default();
    config.agents.push(vesper::config::AgentConfig {
        name: "Second".into(),
        wake_word_model: "hey_second".into(),
        ..Default::default()
    });
    let (supervisor, _dir) = supervisor_with(config.clone()).await;

    let first = supervisor
        .get_or_create_agent(&config, &config.agents[0])
        .await;
    let second = supervisor
        .get_or_create_agent(&config, &config.agents[1])
        .await;
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.name(), "Vesper");
    assert_eq!(second.name(), "Second");
}
