//! Remote research service client
//!
//! Issues a single `POST {base_url}/deep_research` per request and validates
//! the response payload before handing it to callers. No retries: one
//! attempt either succeeds or fails.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default ceiling for a single research request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors from the remote research service
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Transport(reqwest::Error),

    #[error("Timeout waiting for research response")]
    Timeout,

    #[error("Research service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid research payload: {0}")]
    InvalidPayload(#[from] PayloadError),
}

/// Ways a research payload can fail schema validation
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("response body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response body is not a JSON object")]
    NotAnObject,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

/// Wire request for the research service
#[derive(Debug, Serialize)]
struct ResearchQuery<'a> {
    query: &'a str,
}

/// One completed research run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    /// Opaque identifier for correlating this run
    pub trace_id: String,
    /// Long-form markdown report
    pub report: String,
    /// One-paragraph summary
    pub summary: String,
    /// Suggested next questions, in order
    pub follow_up_questions: Vec<String>,
}

/// Validate a raw service payload against the research result shape.
///
/// All four fields are required; `follow_up_questions` must be an array of
/// strings (an empty array is fine). Returns a discriminated failure so
/// callers can tell validation problems apart from transport problems.
pub fn validate_payload(value: &Value) -> Result<ResearchResult, PayloadError> {
    let object = value.as_object().ok_or(PayloadError::NotAnObject)?;

    let string_field = |field: &'static str| -> Result<String, PayloadError> {
        let value = object.get(field).ok_or(PayloadError::MissingField(field))?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or(PayloadError::WrongType {
                field,
                expected: "a string",
            })
    };

    let trace_id = string_field("trace_id")?;
    let report = string_field("report")?;
    let summary = string_field("summary")?;

    let questions = object
        .get("follow_up_questions")
        .ok_or(PayloadError::MissingField("follow_up_questions"))?
        .as_array()
        .ok_or(PayloadError::WrongType {
            field: "follow_up_questions",
            expected: "an array of strings",
        })?;

    let follow_up_questions = questions
        .iter()
        .map(|q| {
            q.as_str()
                .map(str::to_string)
                .ok_or(PayloadError::WrongType {
                    field: "follow_up_questions",
                    expected: "an array of strings",
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ResearchResult {
        trace_id,
        report,
        summary,
        follow_up_questions,
    })
}

/// Explicit configuration for the research client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the research service (no trailing slash needed)
    pub base_url: String,
    /// Ceiling for a single request
    pub timeout: Duration,
}

impl ClientConfig {
    /// Create a config with the default timeout
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Source of research results, seam for the HTTP handlers
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    /// Backend name for logging/identification
    fn name(&self) -> &str;

    /// Run one research request for the given prompt
    async fn fetch_research(&self, prompt: &str) -> Result<ResearchResult, ClientError>;
}

/// HTTP client for the remote research service
pub struct ResearchClient {
    client: Client,
    base_url: String,
}

impl ResearchClient {
    /// Create a new client from an explicit configuration
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(config.timeout)
                .build()
                .expect("Failed to create HTTP client"),
            base_url: config.base_url,
        }
    }
}

#[async_trait]
impl ResearchBackend for ResearchClient {
    fn name(&self) -> &str {
        "deep_research"
    }

    async fn fetch_research(&self, prompt: &str) -> Result<ResearchResult, ClientError> {
        let url = format!("{}/deep_research", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&ResearchQuery { query: prompt })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::Timeout
                } else {
                    ClientError::Transport(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout
            } else {
                ClientError::Transport(e)
            }
        })?;

        debug!(body_len = body.len(), "Got research response");

        let value: Value = serde_json::from_str(&body).map_err(PayloadError::from)?;
        let result = validate_payload(&value)?;

        Ok(result)
    }
}
