//! Runs the bundled demo task flow end to end.

use std::path::PathBuf;

use serde_json::{Map, Value, json};
use server::{ServerConfig, build_core};

fn demo_config() -> ServerConfig {
    ServerConfig {
        task_flow: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/taskflow.yaml"),
        ..ServerConfig::default()
    }
}

fn params(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_demo_scene() {
    let core = build_core(&demo_config()).unwrap();

    let envelope = core.recommend_scene("home", "1", Map::new()).await;
    assert!(envelope.is_success(), "{}", envelope.msg());
    assert_eq!(envelope.data().len(), 3);
    assert!(envelope.data().iter().all(|r| r["id"] == "1"));

    // same subject, same experiment, same answer
    let again = core.recommend_scene("home", "1", Map::new()).await;
    assert_eq!(envelope.data(), again.data());
}

#[tokio::test]
async fn test_demo_external_dependency() {
    let core = build_core(&demo_config()).unwrap();

    let missing = core.invoke_task("profile_feature", Map::new()).await;
    assert_eq!(missing.code(), -1);
    assert!(missing.msg().contains("user_profile"));

    let supplied = core
        .invoke_task(
            "profile_feature",
            params(json!({"user_profile": [{"user_id": "1", "age": 31}]})),
        )
        .await;
    assert!(supplied.is_success(), "{}", supplied.msg());
    assert_eq!(supplied.data()[0]["age"], 31);
}

#[tokio::test]
async fn test_demo_pipeline() {
    let core = build_core(&demo_config()).unwrap();

    let envelope = core
        .recommend("final_rank", params(json!({"preTasks": ["popular_recall"], "id": "2"})))
        .await;
    assert!(envelope.is_success(), "{}", envelope.msg());
    // 4 recalled, then the same 4 deduplicated and projected
    assert_eq!(envelope.data().len(), 8);
}
