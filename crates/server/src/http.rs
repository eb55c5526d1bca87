//! HTTP surface of the execution core.
//!
//! ## Routes
//! - `POST /service/get/{task}`: single task invocation
//! - `POST /service/recommend/{task}`: pre-tasks plus target
//! - `POST /service/recommend/{scene}/{id}`: scene recommend for a subject
//! - `GET /health`
//!
//! Responses are always `200 OK`; failures are reported in the envelope.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use records::Envelope;
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;
use tracing::info;

use crate::orchestrator::ExecutionCore;

pub fn router(core: Arc<ExecutionCore>) -> Router {
    Router::new()
        .route("/service/get/{name}", post(get_task))
        .route("/service/recommend/{name}", post(recommend))
        .route("/service/recommend/{name}/{id}", post(recommend_scene))
        .route("/health", get(health))
        .with_state(core)
}

/// Bind `addr` and serve until Ctrl+C.
pub async fn serve(core: Arc<ExecutionCore>, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(core))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn get_task(
    State(core): State<Arc<ExecutionCore>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Json<Envelope> {
    let envelope = match parse_params(&body) {
        Some(params) => core.invoke_task(&name, params).await,
        None => Envelope::failure("request body must be a JSON object"),
    };
    Json(envelope)
}

async fn recommend(
    State(core): State<Arc<ExecutionCore>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Json<Envelope> {
    let envelope = match parse_params(&body) {
        Some(params) => core.recommend(&name, params).await,
        None => Envelope::failure("request body must be a JSON object"),
    };
    Json(envelope)
}

async fn recommend_scene(
    State(core): State<Arc<ExecutionCore>>,
    Path((name, id)): Path<(String, String)>,
    body: Bytes,
) -> Json<Envelope> {
    // Extra parameters are optional here
    let params = parse_params(&body).unwrap_or_default();
    Json(core.recommend_scene(&name, &id, params).await)
}

async fn health(State(core): State<Arc<ExecutionCore>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "tasks": core.registry().len(),
    }))
}

/// Request parameters from a body. An empty body is no parameters;
/// anything but a JSON object is `None`.
fn parse_params(body: &[u8]) -> Option<Map<String, Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Some(Map::new());
    }
    match serde_json::from_slice(body) {
        Ok(Value::Object(params)) => Some(params),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use task_config::ConfigGraph;
    use tasks::TaskRegistry;
    use tower::ServiceExt;

    const FLOW: &str = r#"
sources:
  - name: items
    columns: [{ name: item_id, type: str }]
    rows: [{ item_id: a }, { item_id: b }]
services:
  - name: recall
    tasks: [items]
experiments:
  - name: exp
    chain: [recall]
layers:
  - name: layer
    experiments: [{ name: exp, ratio: 1 }]
scenes:
  - name: home
    chain: [layer]
"#;

    fn app() -> Router {
        let graph = Arc::new(ConfigGraph::from_yaml_str(FLOW).unwrap());
        let registry = Arc::new(TaskRegistry::from_graph(graph).unwrap());
        router(Arc::new(ExecutionCore::new(registry, Duration::from_secs(1))))
    }

    async fn call(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_get_task() {
        let (status, body) = call(app(), "POST", "/service/get/recall", "{}").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], 0);
        assert_eq!(body["msg"], "success");
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert!(body.get("id").is_none());
    }

    #[tokio::test]
    async fn test_failures_are_200_with_code() {
        let (status, body) = call(app(), "POST", "/service/get/ghost", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], -1);
        assert!(body["msg"].as_str().unwrap().contains("ghost"));

        let (_, body) = call(app(), "POST", "/service/get/recall", "[1]").await;
        assert_eq!(body["code"], -1);
    }

    #[tokio::test]
    async fn test_recommend_with_pre_tasks() {
        let (_, body) = call(
            app(),
            "POST",
            "/service/recommend/recall",
            r#"{"preTasks": ["items"]}"#,
        )
        .await;
        assert_eq!(body["code"], 0);
        // items (2), then recall over them plus its own fetch (4)
        assert_eq!(body["data"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_scene_route_echoes_id() {
        let (_, body) = call(app(), "POST", "/service/recommend/home/u7", "").await;
        assert_eq!(body["code"], 0);
        assert_eq!(body["id"], "u7");
        assert_eq!(body["data"][0]["id"], "u7");
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(app(), "GET", "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["tasks"], 5);
    }
}
