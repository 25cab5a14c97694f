/// Evaluation Service Facade
///
/// Entry point between the HTTP surface and the evaluation engine: resolve
/// blob keys to text, hand the batch to the evaluator on a detached task,
/// and deliver the result to the orchestrator exactly once per accepted
/// job, whatever happened along the way.
use std::sync::Arc;

use arbiter_common::types::{BatchJob, BatchResult, TestCaseSpec, Verdict};
use tracing::info;

use crate::blob::{BlobError, BlobStore};
use crate::callback::OrchestratorClient;
use crate::config::Settings;
use crate::evaluator;
use crate::handlers::ExecuteRequest;

#[derive(Clone)]
pub struct EvaluationService {
    settings: Arc<Settings>,
    blobs: Arc<dyn BlobStore>,
    orchestrator: OrchestratorClient,
}

impl EvaluationService {
    pub fn new(
        settings: Arc<Settings>,
        blobs: Arc<dyn BlobStore>,
        orchestrator: OrchestratorClient,
    ) -> Self {
        EvaluationService {
            settings,
            blobs,
            orchestrator,
        }
    }

    /// Accept a job and evaluate it in the background. The caller returns
    /// its acknowledgement immediately; delivery happens via the callback.
    pub fn submit(&self, request: ExecuteRequest) {
        let service = self.clone();
        tokio::spawn(async move {
            let result = service.resolve_and_evaluate(&request).await;
            service.orchestrator.deliver(&result).await;
        });
    }

    /// Fetch every referenced blob, then run the batch. Fetch failures
    /// short-circuit into a fabricated result; the callback still fires.
    pub(crate) async fn resolve_and_evaluate(&self, request: &ExecuteRequest) -> BatchResult {
        // Shape of the batch for results fabricated before inputs exist.
        let placeholders: Vec<TestCaseSpec> = request
            .test_cases
            .iter()
            .map(|tc| TestCaseSpec {
                test_case_id: tc.test_case_id.clone(),
                stdin: String::new(),
                expected_stdout: String::new(),
                time_limit_ms: tc.time_limit_ms,
                max_ram_mb: tc.max_ram_mb,
            })
            .collect();

        let source_code = match self.blobs.fetch(&request.code_file_path).await {
            Ok(text) => text,
            Err(e) => return fetch_failure(request.submission_id, &placeholders, e),
        };

        let mut test_cases = Vec::with_capacity(request.test_cases.len());
        for tc in &request.test_cases {
            let stdin = match self.blobs.fetch(&tc.input_file_path).await {
                Ok(text) => text,
                Err(e) => return fetch_failure(request.submission_id, &placeholders, e),
            };
            let expected_stdout = match self.blobs.fetch(&tc.expected_output_file_path).await {
                Ok(text) => text,
                Err(e) => return fetch_failure(request.submission_id, &placeholders, e),
            };
            test_cases.push(
                TestCaseSpec {
                    test_case_id: tc.test_case_id.clone(),
                    stdin,
                    expected_stdout,
                    time_limit_ms: tc.time_limit_ms,
                    max_ram_mb: tc.max_ram_mb,
                }
                .clamped(),
            );
        }

        let job = BatchJob {
            language: request.language,
            submission_id: request.submission_id,
            source_code,
            test_cases,
        };

        info!(submission_id = job.submission_id, "job files resolved, evaluating");
        evaluator::evaluate_batch(&job, self.settings.limits, &self.settings.sandbox_root).await
    }
}

fn fetch_failure(submission_id: i64, specs: &[TestCaseSpec], error: BlobError) -> BatchResult {
    match error {
        BlobError::NotFound(key) => BatchResult::fabricated(
            submission_id,
            specs,
            Verdict::FileError,
            &format!("required file not found: {key}"),
            "required file not found",
        ),
        BlobError::Other(e) => BatchResult::fabricated(
            submission_id,
            specs,
            Verdict::InternalError,
            &format!("failed to fetch job files: {e:#}"),
            "failed to fetch job files",
        ),
    }
}
