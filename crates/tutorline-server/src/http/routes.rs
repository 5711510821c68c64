use super::{AppError, AppResult, AppState, JsonResponse};
use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tutorline_core::{
    ChatRequest, ChatTurn, Outcome, PipelineStats, ReplyOptions, SessionMessage, TutorError,
};

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(metrics))
        .route("/api/ai/status", get(status))
        .route("/api/ai/chat", post(chat))
        .route("/api/ai/session/:session_id", delete(clear_session))
        .route("/api/ai/session/:session_id/history", get(session_history))
        .route("/api/ai/cache", delete(flush_cache))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    healthy: bool,
    version: String,
    uptime_seconds: u64,
    started_at: chrono::DateTime<chrono::Utc>,
}

async fn health(State(state): State<AppState>) -> Json<JsonResponse<HealthResponse>> {
    Json(JsonResponse::ok(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        started_at: state.started_at,
    }))
}

async fn stats(State(state): State<AppState>) -> Json<JsonResponse<PipelineStats>> {
    Json(JsonResponse::ok(state.pipeline.stats()))
}

async fn metrics(State(state): State<AppState>) -> AppResult<Response> {
    let body = state
        .metrics
        .render(&state.pipeline.stats(), state.start_time.elapsed().as_secs())
        .map_err(|e| anyhow::anyhow!("metrics encoding failed: {}", e))?;
    Ok(([(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], body).into_response())
}

#[derive(Serialize)]
struct StatusResponse {
    configured: bool,
    model: String,
    cache_size: usize,
    active_sessions: usize,
}

async fn status(State(state): State<AppState>) -> Json<JsonResponse<StatusResponse>> {
    let stats = state.pipeline.stats();
    Json(JsonResponse::ok(StatusResponse {
        configured: stats.provider_configured,
        model: stats.model,
        cache_size: stats.cache.size,
        active_sessions: stats.sessions.active_sessions,
    }))
}

#[derive(Deserialize)]
struct ChatBody {
    #[serde(default)]
    message: String,
    #[serde(default, alias = "sessionId")]
    session_id: Option<String>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    history: Vec<ChatTurn>,
    #[serde(default)]
    options: ReplyOptions,
}

/// Client address when the listener exposes it, else the session, else a shared bucket.
fn caller_key(addr: Option<SocketAddr>, session_id: Option<&str>) -> String {
    match (addr, session_id) {
        (Some(addr), _) => addr.ip().to_string(),
        (None, Some(session)) if !session.is_empty() => session.to_string(),
        _ => "anonymous".to_string(),
    }
}

async fn chat(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(body): Json<ChatBody>,
) -> AppResult<Response> {
    let session_id = body.session_id.filter(|s| !s.trim().is_empty());
    let caller = caller_key(connect_info.map(|c| c.0), session_id.as_deref());

    let mut request = ChatRequest::new(caller, body.message)
        .with_history(body.history)
        .with_options(body.options);
    if let Some(session_id) = session_id {
        request = request.with_session(session_id);
    }
    if let Some(mode) = body.mode.filter(|m| !m.trim().is_empty()) {
        request = request.with_mode(mode);
    }

    match state.pipeline.handle_message(request).await {
        Ok(Outcome::Replied(reply)) => {
            let latency = reply.usage.as_ref().map(|u| u.latency_ms).unwrap_or(0);
            state.metrics.observe_reply(reply.source, latency);
            Ok(Json(reply).into_response())
        }
        Ok(Outcome::RateLimited) => {
            state.metrics.rate_limited.inc();
            Ok((
                StatusCode::TOO_MANY_REQUESTS,
                Json(JsonResponse::<()>::err(
                    "Too many requests. Please wait a minute before asking again.",
                )),
            )
                .into_response())
        }
        Err(e) => {
            if matches!(e, TutorError::Validation(_)) {
                state.metrics.validation_rejected.inc();
            }
            Err(AppError::from(e))
        }
    }
}

#[derive(Serialize)]
struct ClearSessionResponse {
    session_id: String,
    cleared: bool,
}

async fn clear_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<JsonResponse<ClearSessionResponse>> {
    let cleared = state.pipeline.clear_session(&session_id);
    Json(JsonResponse::ok(ClearSessionResponse {
        session_id,
        cleared,
    }))
}

#[derive(Serialize)]
struct HistoryResponse {
    session_id: String,
    messages: Vec<SessionMessage>,
}

async fn session_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<JsonResponse<HistoryResponse>> {
    let messages = state.pipeline.session_history(&session_id);
    Json(JsonResponse::ok(HistoryResponse {
        session_id,
        messages,
    }))
}

#[derive(Serialize)]
struct FlushResponse {
    removed: usize,
}

async fn flush_cache(State(state): State<AppState>) -> Json<JsonResponse<FlushResponse>> {
    let removed = state.pipeline.flush_cache();
    tracing::info!("Response cache flushed: {} entries removed", removed);
    Json(JsonResponse::ok(FlushResponse { removed }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;
    use tutorline_core::{
        Generation, GenerationRequest, Pipeline, PipelineConfig, Provider, ProviderError,
        RateLimitConfig,
    };

    struct EchoProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Provider for EchoProvider {
        fn model(&self) -> &str {
            "echo"
        }

        async fn generate(&self, request: GenerationRequest) -> Result<Generation, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Generation {
                text: format!("echo: {}", request.message),
                input_tokens: 1,
                output_tokens: 2,
            })
        }
    }

    fn app_with(config: PipelineConfig) -> (Router, Arc<EchoProvider>) {
        let provider = Arc::new(EchoProvider {
            calls: AtomicUsize::new(0),
        });
        let pipeline = Arc::new(Pipeline::new(config, provider.clone()));
        (create_router(AppState::new(pipeline)), provider)
    }

    fn app() -> Router {
        app_with(PipelineConfig::default()).0
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_chat_then_cached_repeat() {
        let (app, provider) = app_with(PipelineConfig::default());
        let body = json!({"message": "Объясни, что такое рекурсия", "session_id": "s1"});

        let (status, first) = send(&app, "POST", "/api/ai/chat", Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["success"], true);
        assert_eq!(first["cached"], false);
        assert_eq!(first["source"], "provider");
        assert_eq!(first["usage"]["model"], "echo");

        let (_, second) = send(&app, "POST", "/api/ai/chat", Some(body)).await;
        assert_eq!(second["cached"], true);
        assert_eq!(second["reply"], first["reply"]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let (_, history) = send(&app, "GET", "/api/ai/session/s1/history", None).await;
        assert_eq!(history["data"]["messages"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_empty_message_is_bad_request() {
        let (status, body) =
            send(&app(), "POST", "/api/ai/chat", Some(json!({"message": "   "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("message"));
    }

    #[tokio::test]
    async fn test_rate_limited_is_429() {
        let config =
            PipelineConfig::default().with_rate_limit(RateLimitConfig::new().with_max_requests(1));
        let (app, _) = app_with(config);
        let body = json!({"message": "привет", "session_id": "flood"});

        let (status, _) = send(&app, "POST", "/api/ai/chat", Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, "POST", "/api/ai/chat", Some(body)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body.get("reply").is_none());
    }

    #[tokio::test]
    async fn test_clear_session_and_flush_cache() {
        let app = app();
        send(
            &app,
            "POST",
            "/api/ai/chat",
            Some(json!({"message": "Как устроен цикл for в Python?", "sessionId": "s2"})),
        )
        .await;

        let (_, cleared) = send(&app, "DELETE", "/api/ai/session/s2", None).await;
        assert_eq!(cleared["data"]["cleared"], true);
        let (_, again) = send(&app, "DELETE", "/api/ai/session/s2", None).await;
        assert_eq!(again["data"]["cleared"], false);

        let (_, flushed) = send(&app, "DELETE", "/api/ai/cache", None).await;
        assert_eq!(flushed["data"]["removed"], 1);
    }

    #[tokio::test]
    async fn test_status_and_stats() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/ai/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["configured"], true);
        assert_eq!(body["data"]["model"], "echo");

        let (_, stats) = send(&app, "GET", "/stats", None).await;
        assert_eq!(stats["data"]["cache"]["max_size"], 500);
        assert_eq!(stats["data"]["rate_limit"]["max_requests"], 30);
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let app = app();
        send(&app, "POST", "/api/ai/chat", Some(json!({"message": "hello"}))).await;

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("tutorline_replies_total{source=\"canned\"} 1"));
        assert!(text.contains("tutorline_uptime_seconds"));
    }

    #[test]
    fn test_caller_key_precedence() {
        let addr: SocketAddr = "10.1.2.3:4567".parse().unwrap();
        assert_eq!(caller_key(Some(addr), Some("s")), "10.1.2.3");
        assert_eq!(caller_key(None, Some("s")), "s");
        assert_eq!(caller_key(None, None), "anonymous");
    }
}
