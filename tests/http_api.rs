//! Router-level tests with a mock research backend

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use deep_research::api::{create_router, ApiState};
use deep_research::client::{ClientError, PayloadError, ResearchBackend, ResearchResult};
use deep_research::export::Exporter;
use deep_research::markdown::Renderer;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

enum MockMode {
    Ok,
    Timeout,
    InvalidPayload,
    RemoteStatus,
}

struct MockBackend {
    mode: MockMode,
    calls: AtomicUsize,
}

fn sample_result() -> ResearchResult {
    ResearchResult {
        trace_id: "abc123".to_string(),
        report: "# Summary\nTariffs raise input costs across the supply chain.".to_string(),
        summary: "Tariffs raise costs...".to_string(),
        follow_up_questions: vec!["What about allies?".to_string(), "Timeline?".to_string()],
    }
}

#[async_trait]
impl ResearchBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_research(&self, _prompt: &str) -> Result<ResearchResult, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            MockMode::Ok => Ok(sample_result()),
            MockMode::Timeout => Err(ClientError::Timeout),
            MockMode::InvalidPayload => Err(ClientError::InvalidPayload(
                PayloadError::MissingField("report"),
            )),
            MockMode::RemoteStatus => Err(ClientError::Status {
                status: 500,
                body: "internal".to_string(),
            }),
        }
    }
}

fn make_state(mode: MockMode, enable_export: bool) -> (Arc<ApiState>, Arc<MockBackend>) {
    let backend = Arc::new(MockBackend {
        mode,
        calls: AtomicUsize::new(0),
    });
    let state = Arc::new(ApiState {
        backend: backend.clone(),
        renderer: Arc::new(Renderer::default()),
        exporter: Arc::new(Exporter::new(Duration::from_secs(1))),
        enable_export,
    });
    (state, backend)
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_export_flag() {
    let (state, _) = make_state(MockMode::Ok, false);
    let app = create_router(state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["export_enabled"], false);
}

#[tokio::test]
async fn research_resolves_with_valid_payload() {
    let (state, backend) = make_state(MockMode::Ok, true);
    let app = create_router(state);

    let response = app
        .oneshot(json_request(
            "/api/research",
            json!({"prompt": "impact of tariffs on semiconductor supply chains"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The result shape passes through verbatim
    let body = json_body(response).await;
    assert_eq!(body["trace_id"], "abc123");
    assert_eq!(body["summary"], "Tariffs raise costs...");
    assert_eq!(
        body["follow_up_questions"],
        json!(["What about allies?", "Timeline?"])
    );
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn research_rejects_empty_prompt() {
    let (state, backend) = make_state(MockMode::Ok, true);
    let app = create_router(state);

    let response = app
        .oneshot(json_request("/api/research", json!({"prompt": "   "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = json_body(response).await;
    assert_eq!(body["error"]["kind"], "invalid_prompt");
    // The backend is never reached
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn research_maps_timeout_to_504() {
    let (state, _) = make_state(MockMode::Timeout, true);
    let app = create_router(state);

    let response = app
        .oneshot(json_request("/api/research", json!({"prompt": "anything"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json_body(response).await["error"]["kind"], "timeout");
}

#[tokio::test]
async fn research_maps_invalid_payload_to_502() {
    let (state, _) = make_state(MockMode::InvalidPayload, true);
    let app = create_router(state);

    let response = app
        .oneshot(json_request("/api/research", json!({"prompt": "anything"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body = json_body(response).await;
    assert_eq!(body["error"]["kind"], "invalid_payload");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("report"));
}

#[tokio::test]
async fn research_maps_remote_status_to_502() {
    let (state, _) = make_state(MockMode::RemoteStatus, true);
    let app = create_router(state);

    let response = app
        .oneshot(json_request("/api/research", json!({"prompt": "anything"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["error"]["kind"], "remote_status");
}

#[tokio::test]
async fn render_returns_sanitized_html() {
    let (state, _) = make_state(MockMode::Ok, true);
    let app = create_router(state);

    let response = app
        .oneshot(json_request(
            "/api/render",
            json!({"text": "see [docs](https://example.com) <script>alert(1)</script>"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let html = json_body(response).await["html"].as_str().unwrap().to_string();
    assert!(html.contains("target=\"_blank\" rel=\"noopener noreferrer\""));
    assert!(!html.contains("<script>"));
    assert!(html.contains("&lt;script&gt;"));
}

#[tokio::test]
async fn render_is_deterministic() {
    let (state, _) = make_state(MockMode::Ok, true);
    let app = create_router(state);

    let request = || json_request("/api/render", json!({"text": "# Same\n\ntext"}));
    let first = json_body(app.clone().oneshot(request()).await.unwrap()).await;
    let second = json_body(app.oneshot(request()).await.unwrap()).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn export_disabled_returns_404() {
    let (state, _) = make_state(MockMode::Ok, false);
    let app = create_router(state);

    let response = app
        .oneshot(json_request(
            "/api/export",
            serde_json::to_value(sample_result()).unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"]["kind"], "export_disabled");
}

#[tokio::test]
async fn export_returns_pdf_attachment() {
    let (state, _) = make_state(MockMode::Ok, true);
    let app = create_router(state);

    let response = app
        .oneshot(json_request(
            "/api/export",
            serde_json::to_value(sample_result()).unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/pdf"
    );
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("research.pdf"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn shell_page_gates_export_control() {
    let (state, _) = make_state(MockMode::Ok, false);
    let app = create_router(state);

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let page = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(page.contains("Research Topic"));
    assert!(page.contains("const EXPORT_ENABLED = false;"));
}
