// HTTP route handlers for the worker.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use arbiter_common::types::Language;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Settings;
use crate::AppState;

/// Inbound job: blob keys, not file contents.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub language: Language,
    pub submission_id: i64,
    pub code_file_path: String,
    pub test_cases: Vec<TestCaseRequest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseRequest {
    #[serde(default)]
    pub test_case_id: Option<String>,
    pub input_file_path: String,
    pub expected_output_file_path: String,
    pub time_limit_ms: u64,
    #[serde(rename = "maxRamMB")]
    pub max_ram_mb: u64,
}

/// API-key gate for the execute route. The header name is configured, the
/// comparison is exact.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if authorised(request.headers(), &state.settings) {
        next.run(request).await
    } else {
        warn!("rejected request with missing or invalid API key");
        StatusCode::UNAUTHORIZED.into_response()
    }
}

fn authorised(headers: &HeaderMap, settings: &Settings) -> bool {
    headers
        .get(settings.api_header_name.as_str())
        .and_then(|value| value.to_str().ok())
        .map(|value| value == settings.api_key)
        .unwrap_or(false)
}

/// POST /execute - accept a batch job.
///
/// Acknowledges with an empty 200 and evaluates in the background; the
/// outcome travels via the orchestrator callback, never this response.
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExecuteRequest>,
) -> Response {
    if request.language != state.settings.language {
        // Misrouted job: reject before accepting, so no callback is owed.
        return problem(
            StatusCode::INTERNAL_SERVER_ERROR,
            "unsupported language",
            format!(
                "this worker evaluates '{}', job asked for '{}'",
                state.settings.language, request.language
            ),
        );
    }

    info!(
        submission_id = request.submission_id,
        language = %request.language,
        test_cases = request.test_cases.len(),
        "job accepted"
    );

    state.service.submit(request);
    StatusCode::OK.into_response()
}

/// GET /health - readiness probe.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// RFC 7807 problem response.
fn problem(status: StatusCode, title: &str, detail: String) -> Response {
    let body = serde_json::json!({
        "type": "about:blank",
        "title": title,
        "status": status.as_u16(),
        "detail": detail,
    });
    (
        status,
        [(header::CONTENT_TYPE, "application/problem+json")],
        body.to_string(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BlobBackend, GlobalLimits};
    use axum::http::HeaderValue;
    use std::path::PathBuf;

    fn settings() -> Settings {
        Settings {
            language: Language::C,
            sandbox_root: PathBuf::from("/tmp"),
            limits: GlobalLimits {
                max_time_sec: 10,
                max_memory_mb: 512,
            },
            orchestrator_address: "http://localhost:0".to_string(),
            api_header_name: "X-Api-Key".to_string(),
            api_key: "secret".to_string(),
            blob: BlobBackend::Filesystem(PathBuf::from("/blobs")),
            bind_addr: "127.0.0.1:0".to_string(),
        }
    }

    #[test]
    fn authorised_requires_exact_key() {
        let settings = settings();
        let mut headers = HeaderMap::new();
        assert!(!authorised(&headers, &settings));

        headers.insert("X-Api-Key", HeaderValue::from_static("wrong"));
        assert!(!authorised(&headers, &settings));

        headers.insert("X-Api-Key", HeaderValue::from_static("secret"));
        assert!(authorised(&headers, &settings));
    }

    #[test]
    fn execute_request_parses_the_wire_schema() {
        let body = r#"{
            "language": "java",
            "submissionId": 42,
            "codeFilePath": "sub/42/Solution.java",
            "testCases": [
                {
                    "testCaseId": "tc-1",
                    "inputFilePath": "sub/42/in1.txt",
                    "expectedOutputFilePath": "sub/42/out1.txt",
                    "timeLimitMs": 2500,
                    "maxRamMB": 128
                },
                {
                    "inputFilePath": "sub/42/in2.txt",
                    "expectedOutputFilePath": "sub/42/out2.txt",
                    "timeLimitMs": 1000,
                    "maxRamMB": 64
                }
            ]
        }"#;

        let request: ExecuteRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.language, Language::Java);
        assert_eq!(request.submission_id, 42);
        assert_eq!(request.test_cases.len(), 2);
        assert_eq!(request.test_cases[0].test_case_id.as_deref(), Some("tc-1"));
        assert_eq!(request.test_cases[0].max_ram_mb, 128);
        assert_eq!(request.test_cases[1].test_case_id, None);
        assert_eq!(request.test_cases[1].time_limit_ms, 1000);
    }
}
