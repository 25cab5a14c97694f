mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "arbiter-cli")]
#[command(about = "Arbiter CLI - Smoke-test a running evaluation worker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe a worker's health endpoint
    Health {
        /// Worker base URL
        #[arg(short, long, default_value = "http://127.0.0.1:8080")]
        worker: String,
    },

    /// Stage local files into a filesystem blob root and submit a job
    Submit {
        /// Worker base URL
        #[arg(short, long, default_value = "http://127.0.0.1:8080")]
        worker: String,

        /// Language the worker is configured for
        #[arg(short, long)]
        language: String,

        /// Path to the source file
        #[arg(short, long)]
        source: String,

        /// Path to a stdin payload (repeat once per test case)
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Path to the expected stdout (one per --input, same order)
        #[arg(short, long, required = true)]
        expected: Vec<String>,

        /// Per-case time limit in milliseconds
        #[arg(long, default_value_t = 2000)]
        time_limit_ms: u64,

        /// Per-case memory limit in MB
        #[arg(long, default_value_t = 128)]
        max_ram_mb: u64,

        /// The worker's BLOB_ROOT directory (filesystem backend only)
        #[arg(long)]
        blob_root: String,

        /// Correlation id reported back by the orchestrator callback
        #[arg(long, default_value_t = 1)]
        submission_id: i64,

        /// API key header name the worker expects
        #[arg(long, default_value = "X-Api-Key")]
        header_name: String,

        /// API key value
        #[arg(long)]
        api_key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Health { worker } => commands::health(&worker).await?,
        Commands::Submit {
            worker,
            language,
            source,
            input,
            expected,
            time_limit_ms,
            max_ram_mb,
            blob_root,
            submission_id,
            header_name,
            api_key,
        } => {
            commands::submit(commands::SubmitArgs {
                worker,
                language,
                source,
                input,
                expected,
                time_limit_ms,
                max_ram_mb,
                blob_root,
                submission_id,
                header_name,
                api_key,
            })
            .await?;
        }
    }

    Ok(())
}
