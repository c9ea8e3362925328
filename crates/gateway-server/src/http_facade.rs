//! Minimal HTTP façade: `GET /health`, `GET /tools`, `POST /tools/:name`,
//! and an optional SSE `GET /events` handshake stream.

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{http::StatusCode, Json, Router};
use futures_util::stream::{self, Stream};
use gateway_core::{http_status_for_code, Harness};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct AppState {
    harness: Arc<Harness>,
    actor: String,
}

pub async fn serve_http(harness: Arc<Harness>, actor: String, bind_addr: SocketAddr) -> anyhow::Result<()> {
    let state = AppState { harness, actor };
    let app = Router::new()
        .route("/health", get(health))
        .route("/tools", get(list_tools))
        .route("/tools/{name}", post(call_tool))
        .route("/events", get(events))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("http facade listening on {bind_addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "tools": state.harness.registry().metadata() }))
}

async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<Value>>,
) -> impl IntoResponse {
    let args = body.map(|Json(v)| v);
    match state.harness.invoke(&name, &state.actor, args).await {
        Ok(success) => (
            StatusCode::OK,
            Json(json!({ "request_id": success.request_id, "value": success.value })),
        ),
        Err(failure) => {
            let status = StatusCode::from_u16(http_status_for_code(failure.code)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                Json(json!({
                    "request_id": failure.request_id,
                    "error_code": failure.code,
                    "message": failure.message,
                })),
            )
        }
    }
}

async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let tools = state.harness.registry().metadata();
    let payload = json!({ "tools": tools });
    let event = Event::default().event("connected").data(payload.to_string());
    Sse::new(stream::once(async move { Ok(event) })).keep_alive(
        axum::response::sse::KeepAlive::new().interval(Duration::from_secs(15)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use gateway_core::connectors::fs::FsConnectorConfig;
    use gateway_core::connectors::{FsConnector, HttpConnector, SqlConnector};
    use gateway_core::connectors::http::HttpConnectorConfig;
    use gateway_core::connectors::sql::SqlConnectorConfig;
    use gateway_core::{AuditLogger, PolicyConfig, PolicyEngine, ToolRegistry};
    use std::collections::BTreeSet;
    use tower::ServiceExt;

    fn build_state() -> AppState {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"hi there").unwrap();
        let db_path = dir.path().join("app.db");
        rusqlite::Connection::open(&db_path).unwrap();

        let mut registry = ToolRegistry::new();
        registry
            .register_many(FsConnector::tools(FsConnectorConfig {
                allowed_paths: vec![dir.path().to_path_buf()],
                denied_paths: vec![],
                max_file_size: 1024,
            }))
            .unwrap();
        registry
            .register_many(HttpConnector::tools(HttpConnectorConfig {
                allowed_domains: vec!["*.example.com".to_string()],
                denied_domains: vec![],
                max_response_bytes: 1024,
                timeout_ms: 1000,
            }))
            .unwrap();
        registry
            .register_many(
                SqlConnector::tools(SqlConnectorConfig {
                    path: db_path,
                    max_rows: 10,
                    query_timeout_ms: 1000,
                    pool_max_size: 2,
                    pool_idle_timeout_ms: 1000,
                })
                .unwrap(),
            )
            .unwrap();

        let mut allow_tools = BTreeSet::new();
        allow_tools.insert("fs.readFile".to_string());
        let policy = PolicyEngine::new(PolicyConfig {
            default_deny: true,
            allow_tools,
            deny_tools: BTreeSet::new(),
            per_tool: Default::default(),
            global_timeout_ms: 2000,
            global_max_bytes: 1_000_000,
        });

        AppState {
            harness: Arc::new(Harness::new(registry, policy, AuditLogger::disabled())),
            actor: "actor".to_string(),
        }
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/tools", get(list_tools))
            .route("/tools/{name}", post(call_tool))
            .with_state(state)
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let response = app(build_state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn tools_lists_registered_tools() {
        let response = app(build_state())
            .oneshot(Request::builder().uri("/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn post_tools_name_denied_returns_403() {
        let response = app(build_state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/tools/web.fetch")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"url":"http://evil.com"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn post_tools_name_not_found_returns_404() {
        let response = app(build_state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/tools/nonexistent")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
