use serde::{Deserialize, Serialize};

/// Bounds accepted for per-case limits. Values outside are clamped at the
/// DTO boundary, never rejected.
pub const TIME_LIMIT_MS_MIN: u64 = 100;
pub const TIME_LIMIT_MS_MAX: u64 = 10_000;
pub const MAX_RAM_MB_MIN: u64 = 32;
pub const MAX_RAM_MB_MAX: u64 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    Python,
    Java,
    Rust,
    Go,
}

impl Language {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "c" => Some(Language::C),
            "python" => Some(Language::Python),
            "java" => Some(Language::Java),
            "rust" => Some(Language::Rust),
            "go" => Some(Language::Go),
            _ => None,
        }
    }

    pub fn all_variants() -> &'static [Language] {
        &[
            Language::C,
            Language::Python,
            Language::Java,
            Language::Rust,
            Language::Go,
        ]
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Language::C => "c",
            Language::Python => "python",
            Language::Java => "java",
            Language::Rust => "rust",
            Language::Go => "go",
        };
        f.write_str(name)
    }
}

/// Terminal per-test-case outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    CompileError,
    RuntimeError,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    FileError,
    InternalError,
}

/// One test case: input, expected output, and its own limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseSpec {
    pub test_case_id: Option<String>,
    pub stdin: String,
    pub expected_stdout: String,
    pub time_limit_ms: u64,
    pub max_ram_mb: u64,
}

impl TestCaseSpec {
    /// Force limits into the accepted bounds.
    pub fn clamped(mut self) -> Self {
        self.time_limit_ms = self.time_limit_ms.clamp(TIME_LIMIT_MS_MIN, TIME_LIMIT_MS_MAX);
        self.max_ram_mb = self.max_ram_mb.clamp(MAX_RAM_MB_MIN, MAX_RAM_MB_MAX);
        self
    }
}

/// One source program plus the test cases it is judged against.
/// Compiled once, run once per case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub language: Language,
    pub submission_id: i64,
    pub source_code: String,
    pub test_cases: Vec<TestCaseSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub test_case_id: Option<String>,
    pub status: Verdict,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub memory_exceeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TestCaseResult {
    /// Result for a case that never ran: compile failure, missing blob,
    /// setup error. Streams empty, duration zero.
    pub fn fabricated(test_case_id: Option<String>, status: Verdict, message: &str) -> Self {
        TestCaseResult {
            test_case_id,
            status,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
            duration_ms: 0,
            memory_exceeded: false,
            message: Some(message.to_string()),
        }
    }
}

/// Final outcome for a whole batch, delivered to the orchestrator exactly
/// once. `test_case_results` is aligned 1:1 and in order with the specs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub submission_id: i64,
    pub compilation_success: bool,
    pub compiler_output: String,
    pub test_case_results: Vec<TestCaseResult>,
}

impl BatchResult {
    /// Batch that failed before any case could run: every case carries the
    /// same verdict and message.
    pub fn fabricated(
        submission_id: i64,
        specs: &[TestCaseSpec],
        status: Verdict,
        compiler_output: &str,
        message: &str,
    ) -> Self {
        BatchResult {
            submission_id,
            compilation_success: false,
            compiler_output: compiler_output.to_string(),
            test_case_results: specs
                .iter()
                .map(|tc| TestCaseResult::fabricated(tc.test_case_id.clone(), status, message))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_roundtrip() {
        for lang in Language::all_variants() {
            assert_eq!(Language::from_str(&lang.to_string()), Some(*lang));
        }
        assert_eq!(Language::from_str("cobol"), None);
    }

    #[test]
    fn language_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Language::Go).unwrap(), "\"go\"");
        let lang: Language = serde_json::from_str("\"java\"").unwrap();
        assert_eq!(lang, Language::Java);
    }

    #[test]
    fn verdict_serde_screaming() {
        assert_eq!(
            serde_json::to_string(&Verdict::TimeLimitExceeded).unwrap(),
            "\"TIME_LIMIT_EXCEEDED\""
        );
        let v: Verdict = serde_json::from_str("\"WRONG_ANSWER\"").unwrap();
        assert_eq!(v, Verdict::WrongAnswer);
    }

    #[test]
    fn limits_are_clamped() {
        let spec = TestCaseSpec {
            test_case_id: None,
            stdin: String::new(),
            expected_stdout: String::new(),
            time_limit_ms: 50,
            max_ram_mb: 4096,
        }
        .clamped();
        assert_eq!(spec.time_limit_ms, TIME_LIMIT_MS_MIN);
        assert_eq!(spec.max_ram_mb, MAX_RAM_MB_MAX);
    }

    #[test]
    fn fabricated_batch_preserves_order_and_count() {
        let specs: Vec<TestCaseSpec> = (0..3)
            .map(|i| TestCaseSpec {
                test_case_id: Some(format!("tc-{i}")),
                stdin: String::new(),
                expected_stdout: String::new(),
                time_limit_ms: 1000,
                max_ram_mb: 64,
            })
            .collect();

        let batch = BatchResult::fabricated(7, &specs, Verdict::CompileError, "boom", "boom");
        assert!(!batch.compilation_success);
        assert_eq!(batch.test_case_results.len(), 3);
        for (i, result) in batch.test_case_results.iter().enumerate() {
            assert_eq!(result.test_case_id.as_deref(), Some(format!("tc-{i}").as_str()));
            assert_eq!(result.status, Verdict::CompileError);
        }
    }

    #[test]
    fn batch_result_snake_case_fields() {
        let batch = BatchResult {
            submission_id: 1,
            compilation_success: true,
            compiler_output: String::new(),
            test_case_results: vec![],
        };
        let json = serde_json::to_string(&batch).unwrap();
        assert!(json.contains("\"submission_id\""));
        assert!(json.contains("\"compilation_success\""));
        assert!(json.contains("\"test_case_results\""));
    }
}
