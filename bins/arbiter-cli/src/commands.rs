use anyhow::{bail, Context, Result};
use arbiter_common::types::Language;
use std::path::Path;

pub struct SubmitArgs {
    pub worker: String,
    pub language: String,
    pub source: String,
    pub input: Vec<String>,
    pub expected: Vec<String>,
    pub time_limit_ms: u64,
    pub max_ram_mb: u64,
    pub blob_root: String,
    pub submission_id: i64,
    pub header_name: String,
    pub api_key: String,
}

pub async fn health(worker: &str) -> Result<()> {
    let url = format!("{}/health", worker.trim_end_matches('/'));
    let response = reqwest::get(&url).await.with_context(|| format!("GET {url}"))?;
    println!("{} -> {}", url, response.status());
    Ok(())
}

/// Copy the local files into the worker's blob root under a per-submission
/// prefix, then submit the job referencing those keys. The verdicts arrive
/// at the orchestrator callback, not here.
pub async fn submit(args: SubmitArgs) -> Result<()> {
    if Language::from_str(&args.language).is_none() {
        bail!(
            "unknown language '{}'; valid options: {}",
            args.language,
            Language::all_variants()
                .iter()
                .map(|l| l.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    if args.input.len() != args.expected.len() {
        bail!(
            "need one --expected per --input ({} inputs, {} expected)",
            args.input.len(),
            args.expected.len()
        );
    }

    let prefix = format!("cli/{}", args.submission_id);
    let staging = Path::new(&args.blob_root).join(&prefix);
    tokio::fs::create_dir_all(&staging)
        .await
        .with_context(|| format!("failed to create {}", staging.display()))?;

    let code_key = format!("{prefix}/source");
    stage(&args.blob_root, &code_key, &args.source).await?;

    let mut test_cases = Vec::with_capacity(args.input.len());
    for (idx, (input, expected)) in args.input.iter().zip(&args.expected).enumerate() {
        let input_key = format!("{prefix}/in-{idx}");
        let expected_key = format!("{prefix}/out-{idx}");
        stage(&args.blob_root, &input_key, input).await?;
        stage(&args.blob_root, &expected_key, expected).await?;

        test_cases.push(serde_json::json!({
            "testCaseId": format!("cli-{idx}"),
            "inputFilePath": input_key,
            "expectedOutputFilePath": expected_key,
            "timeLimitMs": args.time_limit_ms,
            "maxRamMB": args.max_ram_mb,
        }));
    }

    let body = serde_json::json!({
        "language": args.language,
        "submissionId": args.submission_id,
        "codeFilePath": code_key,
        "testCases": test_cases,
    });

    let url = format!("{}/execute", args.worker.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&url)
        .header(args.header_name.as_str(), args.api_key.as_str())
        .json(&body)
        .send()
        .await
        .with_context(|| format!("POST {url}"))?;

    println!("{} -> {}", url, response.status());
    if !response.status().is_success() {
        let text = response.text().await.unwrap_or_default();
        if !text.is_empty() {
            println!("{text}");
        }
        bail!("worker rejected the job");
    }

    println!(
        "job {} accepted ({} test cases); result goes to the orchestrator callback",
        args.submission_id,
        args.input.len()
    );
    Ok(())
}

async fn stage(blob_root: &str, key: &str, local: &str) -> Result<()> {
    let target = Path::new(blob_root).join(key);
    tokio::fs::copy(local, &target)
        .await
        .with_context(|| format!("failed to stage {local} as {}", target.display()))?;
    Ok(())
}
