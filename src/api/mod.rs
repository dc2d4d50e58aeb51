//! Web API and embedded presentation shell
//!
//! One page, three JSON operations: run a research request, render a report
//! to HTML, export a result as PDF. Failures surface as discriminated error
//! bodies so the shell can show a message instead of failing silently.

use crate::client::{ClientError, ResearchBackend, ResearchResult};
use crate::export::{Exporter, EXPORT_FILENAME};
use crate::markdown::Renderer;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// API state
pub struct ApiState {
    pub backend: Arc<dyn ResearchBackend>,
    pub renderer: Arc<Renderer>,
    pub exporter: Arc<Exporter>,
    pub enable_export: bool,
}

/// Request to run a research prompt
#[derive(Debug, Deserialize)]
pub struct ResearchRequest {
    pub prompt: String,
}

/// Request to render report markdown
#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub text: String,
}

/// Rendered report HTML
#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub html: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub export_enabled: bool,
}

/// Error body returned by every failing operation
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
}

fn error_body(
    status: StatusCode,
    kind: &str,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            error: ErrorDetail {
                kind: kind.to_string(),
                message: message.into(),
            },
        }),
    )
}

/// Map a research client failure onto a status and error body
fn client_error_response(err: &ClientError) -> (StatusCode, Json<ErrorBody>) {
    let (status, kind) = match err {
        ClientError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        ClientError::Transport(_) => (StatusCode::BAD_GATEWAY, "transport"),
        ClientError::Status { .. } => (StatusCode::BAD_GATEWAY, "remote_status"),
        ClientError::InvalidPayload(_) => (StatusCode::BAD_GATEWAY, "invalid_payload"),
    };
    error_body(status, kind, err.to_string())
}

/// Create the API router
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(shell_page))
        .route("/health", get(health_check))
        .route("/api/research", post(get_research))
        .route("/api/render", post(render_report))
        .route("/api/export", post(export_pdf))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the presentation shell
async fn shell_page(State(state): State<Arc<ApiState>>) -> Html<String> {
    Html(render_shell(state.enable_export))
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        export_enabled: state.enable_export,
    })
}

/// Run one research request and return the result verbatim
async fn get_research(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ResearchRequest>,
) -> Result<Json<ResearchResult>, (StatusCode, Json<ErrorBody>)> {
    if request.prompt.trim().is_empty() {
        return Err(error_body(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_prompt",
            "prompt must not be empty",
        ));
    }

    info!(prompt_len = request.prompt.len(), "Running research request");

    match state.backend.fetch_research(&request.prompt).await {
        Ok(result) => {
            info!(trace_id = %result.trace_id, "Research request resolved");
            Ok(Json(result))
        }
        Err(e) => {
            warn!(backend = state.backend.name(), error = %e, "Research request failed");
            Err(client_error_response(&e))
        }
    }
}

/// Render report markdown to sanitized HTML
async fn render_report(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<RenderRequest>,
) -> Json<RenderResponse> {
    let rendered = state.renderer.render(&request.text);
    Json(RenderResponse {
        html: rendered.html.clone(),
    })
}

/// Export a research result as a PDF download
async fn export_pdf(
    State(state): State<Arc<ApiState>>,
    Json(result): Json<ResearchResult>,
) -> Response {
    if !state.enable_export {
        return error_body(
            StatusCode::NOT_FOUND,
            "export_disabled",
            "PDF export is disabled",
        )
        .into_response();
    }

    match state.exporter.export(&result, &state.renderer).await {
        Ok(bytes) => {
            info!(trace_id = %result.trace_id, bytes = bytes.len(), "Exported research PDF");
            (
                [
                    (header::CONTENT_TYPE, "application/pdf".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{EXPORT_FILENAME}\""),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            warn!(trace_id = %result.trace_id, error = %e, "PDF export failed");
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "export_failed",
                e.to_string(),
            )
            .into_response()
        }
    }
}

/// Instantiate the shell page for the configured feature set
pub fn render_shell(enable_export: bool) -> String {
    SHELL_HTML.replace(
        "__EXPORT_ENABLED__",
        if enable_export { "true" } else { "false" },
    )
}

const SHELL_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Deep Research</title>
    <style>
        :root {
            --bg: #f5f5f7;
            --card: #ffffff;
            --border: #e2e2e6;
            --text: #1c1c1e;
            --muted: #6e6e73;
            --accent: #1c1c1e;
            --error-bg: #fdecec;
            --error-text: #b3261e;
        }
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body {
            font-family: -apple-system, 'Segoe UI', Roboto, sans-serif;
            background: var(--bg);
            color: var(--text);
            min-height: 100vh;
            padding: 32px 16px;
        }
        .container { max-width: 56rem; margin: 0 auto; }
        h1 {
            text-align: center;
            font-size: 2.25rem;
            font-weight: 700;
            margin-bottom: 24px;
        }
        .card {
            background: var(--card);
            border: 1px solid var(--border);
            border-radius: 12px;
            margin-bottom: 24px;
            overflow: hidden;
        }
        .card-header {
            padding: 16px 20px;
            border-bottom: 1px solid var(--border);
            font-weight: 600;
        }
        .card-body { padding: 20px; }
        textarea {
            width: 100%;
            min-height: 200px;
            resize: none;
            padding: 16px;
            border: 1px solid var(--border);
            border-radius: 8px;
            font-family: inherit;
            font-size: 0.95rem;
        }
        textarea:focus { outline: 2px solid var(--accent); }
        .actions {
            display: flex;
            justify-content: flex-end;
            gap: 12px;
            margin-top: 16px;
        }
        button {
            background: var(--accent);
            color: #fff;
            border: none;
            border-radius: 8px;
            padding: 10px 22px;
            font-size: 0.95rem;
            font-weight: 600;
            cursor: pointer;
            display: inline-flex;
            align-items: center;
            gap: 8px;
        }
        button:hover { opacity: 0.85; }
        button:disabled { opacity: 0.5; cursor: not-allowed; }
        .spinner {
            width: 14px;
            height: 14px;
            border: 2px solid rgba(255,255,255,0.4);
            border-top-color: #fff;
            border-radius: 50%;
            animation: spin 0.8s linear infinite;
        }
        @keyframes spin { to { transform: rotate(360deg); } }
        .error-banner {
            background: var(--error-bg);
            color: var(--error-text);
            border: 1px solid var(--error-text);
            border-radius: 8px;
            padding: 14px 18px;
            margin-bottom: 24px;
        }
        .trace {
            text-align: center;
            color: var(--muted);
            font-size: 0.85rem;
            margin-bottom: 24px;
        }
        .hidden { display: none; }
        .followups { padding-left: 20px; }
        .followups li { margin-bottom: 8px; }

        /* Rendered report */
        .report { line-height: 1.65; overflow-wrap: break-word; }
        .report h1, .report h2, .report h3 { margin: 18px 0 10px; }
        .report p { margin-bottom: 10px; }
        .report p:last-child { margin-bottom: 0; }
        .report ul, .report ol { margin: 0 0 10px 22px; }
        .report blockquote {
            border-left: 3px solid var(--border);
            padding-left: 14px;
            color: var(--muted);
            margin-bottom: 10px;
        }
        .report code {
            background: #f0f0f2;
            border-radius: 4px;
            padding: 1px 5px;
            font-family: 'SF Mono', Consolas, monospace;
            font-size: 0.88em;
        }
        .report .code-block {
            margin: 14px 0;
            border-radius: 8px;
            overflow: hidden;
            background: #1c1c1e;
        }
        .report .code-block-header {
            padding: 6px 14px;
            background: #2c2c2e;
            color: #d0d0d5;
            font-size: 0.75rem;
            text-transform: lowercase;
        }
        .report .code-block pre {
            padding: 14px;
            overflow-x: auto;
        }
        .report .code-block code {
            background: none;
            color: #f2f2f5;
            padding: 0;
        }
        .report .table-wrap { margin: 14px 0; overflow-x: auto; }
        .report table {
            min-width: 100%;
            border-collapse: collapse;
            border: 1px solid var(--border);
        }
        .report thead { background: #f0f0f2; }
        .report th, .report td {
            border: 1px solid var(--border);
            padding: 8px 14px;
            text-align: left;
        }
        .report th { font-weight: 600; }
        .report tr { border-bottom: 1px solid var(--border); }
        .report img { max-width: 100%; }
        .report .math-display { margin: 12px 0; text-align: center; }
        .cursor {
            display: inline-block;
            animation: pulse 1.1s ease-in-out infinite;
            cursor: default;
        }
        @keyframes pulse { 50% { opacity: 0.25; } }
    </style>
</head>
<body>
    <div class="container">
        <h1>Deep Research</h1>

        <div class="card">
            <div class="card-header">Research Topic</div>
            <div class="card-body">
                <form id="researchForm">
                    <textarea id="prompt" placeholder="Enter your research topic..."></textarea>
                    <div class="actions">
                        <button id="submitBtn" type="submit">Generate</button>
                    </div>
                </form>
            </div>
        </div>

        <div id="errorBanner" class="error-banner hidden"></div>

        <div id="results" class="hidden">
            <div class="card">
                <div class="card-header">Research Summary</div>
                <div class="card-body"><p id="summary"></p></div>
            </div>

            <div class="card">
                <div class="card-header">Detailed Report</div>
                <div class="card-body"><div id="report" class="report"></div></div>
            </div>

            <div class="card">
                <div class="card-header">Follow-up Questions</div>
                <div class="card-body"><ul id="followups" class="followups"></ul></div>
            </div>

            <div id="trace" class="trace"></div>

            <div id="exportRow" class="actions hidden">
                <button id="exportBtn" type="button">Export PDF</button>
            </div>
        </div>
    </div>

    <script>
        const EXPORT_ENABLED = __EXPORT_ENABLED__;

        // Shell states: idle -> loading -> resolved | failed
        let research = null;
        let loading = false;

        const form = document.getElementById('researchForm');
        const submitBtn = document.getElementById('submitBtn');
        const errorBanner = document.getElementById('errorBanner');
        const results = document.getElementById('results');
        const exportBtn = document.getElementById('exportBtn');

        form.addEventListener('submit', handleSubmit);
        exportBtn.addEventListener('click', handleExport);

        function setLoading(value) {
            loading = value;
            submitBtn.disabled = value;
            submitBtn.innerHTML = value
                ? '<span class="spinner"></span>Generating...'
                : 'Generate';
        }

        function showError(message) {
            errorBanner.textContent = message;
            errorBanner.classList.remove('hidden');
        }

        async function readError(response, fallback) {
            try {
                const body = await response.json();
                if (body.error && body.error.message) return body.error.message;
            } catch (e) { /* non-JSON body */ }
            return fallback + ' (HTTP ' + response.status + ')';
        }

        async function handleSubmit(ev) {
            ev.preventDefault();
            if (loading) return;

            const prompt = document.getElementById('prompt').value;
            setLoading(true);
            errorBanner.classList.add('hidden');

            try {
                const res = await fetch('/api/research', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({ prompt })
                });
                if (!res.ok) {
                    throw new Error(await readError(res, 'Research request failed'));
                }
                research = await res.json();

                const renderRes = await fetch('/api/render', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({ text: research.report })
                });
                if (!renderRes.ok) {
                    throw new Error(await readError(renderRes, 'Report rendering failed'));
                }
                const rendered = await renderRes.json();
                showResolved(rendered.html);
            } catch (err) {
                showError(err.message);
            } finally {
                setLoading(false);
            }
        }

        function showResolved(reportHtml) {
            document.getElementById('summary').textContent = research.summary;
            document.getElementById('report').innerHTML = reportHtml;

            const list = document.getElementById('followups');
            list.innerHTML = '';
            for (const question of research.follow_up_questions) {
                const li = document.createElement('li');
                li.textContent = question;
                list.appendChild(li);
            }

            document.getElementById('trace').textContent = 'Trace ID: ' + research.trace_id;

            if (EXPORT_ENABLED) {
                document.getElementById('exportRow').classList.remove('hidden');
            }
            results.classList.remove('hidden');
        }

        async function handleExport() {
            if (!research) return;
            exportBtn.disabled = true;
            exportBtn.textContent = 'Exporting...';

            try {
                const res = await fetch('/api/export', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify(research)
                });
                if (!res.ok) {
                    throw new Error(await readError(res, 'PDF export failed'));
                }
                const blob = await res.blob();
                const link = document.createElement('a');
                link.href = URL.createObjectURL(blob);
                link.download = 'research.pdf';
                link.click();
                URL.revokeObjectURL(link.href);
            } catch (err) {
                showError(err.message);
            } finally {
                exportBtn.disabled = false;
                exportBtn.textContent = 'Export PDF';
            }
        }
    </script>
</body>
</html>
"##;
