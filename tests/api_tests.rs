//! HTTP endpoint tests
//!
//! Requests go straight through the router with `tower::ServiceExt::oneshot`;
//! no socket is bound.
//!
//! Run with: cargo test --test api_tests

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::tempdir;
use tower::ServiceExt;

use rewardscope::storage::{MemoryStore, RunWriter, SharedStore};
use rewardscope::{
    router, AppState, DashboardConfig, DashboardServer, EpisodeRecord, LiveConfig, StepRecord,
};

async fn get(state: &AppState, uri: &str) -> Value {
    let response = router(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK, "status for {}", uri);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn memory_state() -> (Arc<MemoryStore>, AppState) {
    let memory = Arc::new(MemoryStore::new());
    let store: SharedStore = memory.clone();
    let state = AppState::new("ppo-test", Some(store), LiveConfig::default());
    (memory, state)
}

#[tokio::test]
async fn test_reward_history() {
    let (memory, state) = memory_state();
    for step in 1..=150 {
        memory.push_step(StepRecord::new(step, step / 50, step as f64 / 10.0));
    }

    let body = get(&state, "/api/reward-history").await;
    assert_eq!(body["steps"].as_array().unwrap().len(), 100);
    assert_eq!(body["steps"][0], 51);
    assert_eq!(body["steps"][99], 150);
    assert_eq!(body["episodes"][99], 3);

    let body = get(&state, "/api/reward-history?n=3").await;
    assert_eq!(
        body,
        json!({"steps": [148, 149, 150], "rewards": [14.8, 14.9, 15.0], "episodes": [2, 2, 3]})
    );
}

#[tokio::test]
async fn test_reward_history_with_fewer_records_than_window() {
    let (memory, state) = memory_state();
    memory.push_step(StepRecord::new(1, 0, 0.5));
    memory.push_step(StepRecord::new(2, 0, 0.5));

    let body = get(&state, "/api/reward-history?n=100").await;
    assert_eq!(body["steps"], json!([1, 2]));
}

#[tokio::test]
async fn test_component_breakdown() {
    let (memory, state) = memory_state();
    memory.push_step(StepRecord::new(1, 0, 1.0).with_component("a", 1.0));
    memory.push_step(StepRecord::new(2, 0, -2.0).with_component("a", -2.0));

    let body = get(&state, "/api/component-breakdown?n=2").await;
    assert_eq!(body, json!({"components": ["a"], "values": [3.0]}));
}

#[tokio::test]
async fn test_episode_history_and_alerts() {
    let (memory, state) = memory_state();
    memory.push_episode(EpisodeRecord::new(1, 12.0, 200).with_hacking(0.92, &["reward_hacking"]));
    memory.push_episode(EpisodeRecord::new(2, 8.0, 150));

    let body = get(&state, "/api/episode-history").await;
    assert_eq!(
        body,
        json!({
            "episodes": [1, 2],
            "total_rewards": [12.0, 8.0],
            "lengths": [200, 150],
            "hacking_scores": [0.92, 0.0]
        })
    );

    let body = get(&state, "/api/alerts").await;
    assert_eq!(
        body,
        json!({"alerts": [{
            "episode": 1,
            "type": "reward_hacking",
            "severity": 0.92,
            "description": "Reward Hacking"
        }]})
    );
}

#[tokio::test]
async fn test_alerts_only_scan_recent_episodes() {
    let (memory, state) = memory_state();
    memory.push_episode(EpisodeRecord::new(1, 0.0, 10).with_hacking(1.0, &["old_flag"]));
    for episode in 2..=11 {
        memory.push_episode(EpisodeRecord::new(episode, 0.0, 10));
    }

    let body = get(&state, "/api/alerts").await;
    assert_eq!(body, json!({"alerts": []}));
}

#[tokio::test]
async fn test_missing_store_reports_error_on_every_endpoint() {
    let state = AppState::new("orphan", None, LiveConfig::default());

    for uri in [
        "/api/reward-history",
        "/api/component-breakdown",
        "/api/episode-history",
        "/api/alerts",
    ] {
        let body = get(&state, uri).await;
        assert_eq!(
            body,
            json!({"error": "No data collector initialized"}),
            "endpoint {}",
            uri
        );
    }

    let health = get(&state, "/health").await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["store_available"], false);
}

#[tokio::test]
async fn test_offline_store_reports_error() {
    let (memory, state) = memory_state();
    memory.set_offline(true);

    let body = get(&state, "/api/reward-history").await;
    assert!(body["error"].as_str().unwrap().contains("offline"));
}

#[tokio::test]
async fn test_bad_window_parameter_is_json_error() {
    let (_memory, state) = memory_state();
    let body = get(&state, "/api/reward-history?n=lots").await;
    assert!(body.get("error").is_some());
}

#[tokio::test]
async fn test_run_and_sessions_endpoints() {
    let (_memory, state) = memory_state();

    let run = get(&state, "/api/run").await;
    assert_eq!(run, json!({"run_name": "ppo-test", "store": "memory"}));

    let sessions = get(&state, "/api/sessions").await;
    assert_eq!(sessions, json!({"count": 0, "sessions": []}));
}

#[tokio::test]
async fn test_sqlite_run_database_end_to_end() {
    let dir = tempdir().unwrap();
    let config = DashboardConfig::new("sac-hopper", dir.path());

    let writer = RunWriter::create(config.db_path()).unwrap();
    for step in 1..=5 {
        writer
            .append_step(
                &StepRecord::new(step, 0, 1.0)
                    .with_component("forward", 1.5)
                    .with_component("ctrl_cost", -0.5),
            )
            .unwrap();
    }
    writer
        .append_episode(&EpisodeRecord::new(0, 5.0, 5).with_hacking(0.4, &["action_repeat"]))
        .unwrap();

    let server = DashboardServer::open(config);
    let state = server.state().clone();
    assert!(state.has_store());

    let body = get(&state, "/api/component-breakdown").await;
    assert_eq!(
        body,
        json!({"components": ["forward", "ctrl_cost"], "values": [7.5, 2.5]})
    );

    let body = get(&state, "/api/alerts").await;
    assert_eq!(body["alerts"][0]["description"], "Action Repeat");
}

#[tokio::test]
async fn test_corrupt_component_json_is_reported_not_hidden() {
    let dir = tempdir().unwrap();
    let config = DashboardConfig::new("corrupt", dir.path());

    let writer = RunWriter::create(config.db_path()).unwrap();
    writer
        .append_step(&StepRecord::new(1, 0, 1.0).with_component("forward", 1.0))
        .unwrap();
    writer
        .with_transaction(|conn| {
            conn.execute(
                "INSERT INTO steps (step, episode, reward, reward_components)
                 VALUES (2, 0, 1.0, 'not json')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

    let server = DashboardServer::open(config);
    let body = get(server.state(), "/api/component-breakdown").await;
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("malformed"), "got {}", message);
}

#[tokio::test]
async fn test_missing_run_database_starts_without_store() {
    let dir = tempdir().unwrap();
    let server = DashboardServer::open(DashboardConfig::new("never-written", dir.path()));
    assert!(!server.state().has_store());

    let body = get(server.state(), "/api/episode-history").await;
    assert!(body.get("error").is_some());
}
