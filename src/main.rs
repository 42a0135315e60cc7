use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use skiff::fs::OpendalStore;
use skiff::sync::{SyncConfig, SyncEngine, SyncResult};

#[derive(Parser)]
#[command(
    name = "skiff",
    about = "Keep a local workspace in sync with an object-storage prefix"
)]
struct Cli {
    /// Remote bucket
    #[arg(long, env = "SKIFF_BUCKET")]
    bucket: String,

    /// Key prefix ("folder") inside the bucket
    #[arg(long, env = "SKIFF_PREFIX")]
    prefix: String,

    /// Local workspace directory
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Bucket region
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    region: String,

    /// Custom S3-compatible endpoint (MinIO, R2, ...)
    #[arg(long)]
    endpoint: Option<String>,

    /// Use Google Cloud Storage instead of S3
    #[arg(long)]
    gcs: bool,

    /// Additional ignore patterns (gitignore syntax, repeatable)
    #[arg(long = "ignore")]
    ignore_patterns: Vec<String>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download the remote prefix into the workspace, deleting local files
    /// the remote no longer has
    Pull,
    /// Upload local files whose content changed since the last sync
    Push,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let store = if cli.gcs {
        OpendalStore::gcs(&cli.bucket, None)?
    } else if let Some(endpoint) = &cli.endpoint {
        OpendalStore::s3_with_endpoint(&cli.bucket, &cli.region, endpoint)?
    } else {
        OpendalStore::s3_with_iam(&cli.bucket, &cli.region)?
    };

    let config = SyncConfig::new(cli.bucket, cli.prefix, cli.dir)
        .with_ignore_patterns(cli.ignore_patterns);
    let engine = Arc::new(SyncEngine::new(config, Arc::new(store))?);

    // Log progress ticks as they arrive.
    let mut progress_rx = engine.subscribe_progress();
    tokio::spawn(async move {
        while let Ok(tick) = progress_rx.recv().await {
            info!(
                phase = ?tick.phase,
                current = tick.current,
                total = tick.total,
                percentage = tick.percentage,
                file = %tick.current_file,
                "Transfer progress"
            );
        }
    });

    let result = match cli.command {
        Command::Pull => engine.pull().await?,
        Command::Push => engine.push().await?,
    };

    report(&result, cli.json)?;
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

fn report(result: &SyncResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    let status = if result.success {
        "ok".green()
    } else {
        "failed".red()
    };
    println!(
        "{} downloaded {} uploaded {} deleted {} in {}ms",
        status,
        result.downloaded_files,
        result.uploaded_files,
        result.deleted_files,
        result.duration_ms,
    );
    for error in &result.errors {
        eprintln!("  {} {}", "error:".red(), error);
    }
    Ok(())
}
