//! Sumi-Glean main entry point
//!
//! This is the command-line interface for the Sumi-Glean image harvester.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use sumi_glean::config::{load_config_with_hash, validate_request, Config};
use sumi_glean::storage::{ImageStore, JobStore, SqliteStorage};
use sumi_glean::{Coordinator, CrawlJob, CrawlRequest, StartOutcome};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Sumi-Glean: a same-origin image harvester
///
/// Sumi-Glean crawls a website breadth-first from a seed URL without leaving
/// its origin, and records every image it finds on the way.
#[derive(Parser, Debug)]
#[command(name = "sumi-glean")]
#[command(version = "1.0.0")]
#[command(about = "A same-origin image harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Seed URL to crawl
    #[arg(value_name = "URL", required_unless_present_any = ["list_jobs", "images"])]
    url: Option<String>,

    /// Page budget for this crawl (overrides crawler.max-pages)
    #[arg(long)]
    max_pages: Option<u32>,

    /// Per-request timeout in seconds (overrides crawler.timeout-ms)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Also collect CSS background-image URLs
    #[arg(long)]
    css_backgrounds: bool,

    /// Keep results in memory instead of the configured database
    #[arg(long)]
    in_memory: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// List stored jobs and exit
    #[arg(long, conflicts_with_all = ["images", "dry_run"])]
    list_jobs: bool,

    /// Print the images recorded for a job and exit
    #[arg(long, value_name = "JOB_ID", conflicts_with_all = ["list_jobs", "dry_run"])]
    images: Option<i64>,

    /// Validate config and request, show what would be crawled, and exit
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.list_jobs {
        return handle_list_jobs(&config);
    }
    if let Some(job_id) = cli.images {
        return handle_images(&config, job_id);
    }

    let request = build_request(&cli, &config)?;
    validate_request(&request)?;

    if cli.dry_run {
        handle_dry_run(&config, &request, cli.in_memory);
        return Ok(());
    }

    let storage = if cli.in_memory {
        SqliteStorage::new_in_memory()?
    } else {
        SqliteStorage::new(Path::new(&config.output.database_path))?
    };
    let coordinator = Coordinator::new(&config, storage)?;

    let job = handle_crawl(&coordinator, request, cli.quiet).await?;
    print_summary(&coordinator, &job, cli.quiet)
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_glean=info,warn"),
            1 => EnvFilter::new("sumi_glean=debug,info"),
            2 => EnvFilter::new("sumi_glean=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Combines the command line with config defaults into a crawl request
fn build_request(cli: &Cli, config: &Config) -> anyhow::Result<CrawlRequest> {
    let Some(url) = cli.url.clone() else {
        bail!("a seed URL is required");
    };

    Ok(CrawlRequest {
        target_url: url,
        max_pages: cli.max_pages.unwrap_or(config.crawler.max_pages),
        timeout_ms: cli
            .timeout_secs
            .map(|secs| secs.saturating_mul(1000))
            .unwrap_or(config.crawler.timeout_ms),
        include_css_backgrounds: cli.css_backgrounds || config.crawler.include_css_backgrounds,
    })
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config, request: &CrawlRequest, in_memory: bool) {
    println!("=== Sumi-Glean Dry Run ===\n");

    println!("Request:");
    println!("  Seed: {}", request.target_url);
    println!("  Max pages: {}", request.max_pages);
    println!("  Timeout: {}ms", request.timeout_ms);
    println!("  CSS backgrounds: {}", request.include_css_backgrounds);

    println!("\nRetry:");
    println!("  Attempts: {}", config.retry.max_attempts);
    println!("  Base delay: {}ms", config.retry.base_delay_ms);
    println!("  Timeout base delay: {}ms", config.retry.timeout_base_delay_ms);

    println!("\nUser Agent: {}", config.user_agent.header_value());
    println!("Next.js image fix-up: {}", config.crawler.next_image_fixup);

    if in_memory {
        println!("\nOutput: in-memory (results discarded on exit)");
    } else {
        println!("\nOutput: {}", config.output.database_path);
    }

    println!("\n✓ Configuration and request are valid");
}

/// Handles the --list-jobs mode
fn handle_list_jobs(config: &Config) -> anyhow::Result<()> {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let jobs = storage.list_jobs()?;

    if jobs.is_empty() {
        println!("No jobs recorded in {}", config.output.database_path);
        return Ok(());
    }

    for job in &jobs {
        println!(
            "{:>5}  {:<9}  {:>3}%  pages={:<4} images={:<5} {}",
            job.id,
            job.status.to_db_string(),
            job.progress,
            job.pages_processed,
            job.images_found,
            job.target_url
        );
        if let Some(error) = &job.error {
            println!("       error: {}", error);
        }
    }

    Ok(())
}

/// Handles the --images mode
fn handle_images(config: &Config, job_id: i64) -> anyhow::Result<()> {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    if storage.get_job(job_id)?.is_none() {
        bail!("job {} not found", job_id);
    }

    for image in storage.list_images_by_job(job_id)? {
        println!(
            "{}\t{}\t{}",
            image.page_url,
            image.image_url,
            image.alt_text.as_deref().unwrap_or("")
        );
    }

    Ok(())
}

/// Runs a crawl, printing progress until the job finishes
///
/// Ctrl-C requests cancellation; the job then ends as failed.
async fn handle_crawl(
    coordinator: &Coordinator<SqliteStorage>,
    request: CrawlRequest,
    quiet: bool,
) -> anyhow::Result<CrawlJob> {
    let job = coordinator.submit(request)?;
    let mut progress = coordinator.subscribe(job.id).await?;

    let handle = match coordinator.start(job.id)? {
        StartOutcome::Started(handle) => handle,
        StartOutcome::AlreadyRunning => bail!("job {} is already running", job.id),
    };

    let mut interrupted = false;
    loop {
        tokio::select! {
            received = progress.recv() => match received {
                Ok(snapshot) => {
                    if !quiet {
                        println!("{}", snapshot);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Progress display fell behind; skipped {} update(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                tracing::warn!("Interrupted; cancelling job {}", job.id);
                coordinator.cancel(job.id)?;
            }
        }
    }

    Ok(handle.await??)
}

fn print_summary(coordinator: &Coordinator<SqliteStorage>, job: &CrawlJob, quiet: bool) -> anyhow::Result<()> {
    if let Some(error) = &job.error {
        tracing::error!("Job {} failed: {}", job.id, error);
    }
    if quiet {
        return Ok(());
    }

    println!("\n=== Job {} {} ===", job.id, job.status);
    println!("  Pages processed: {}", job.pages_processed);
    println!("  Pages found: {}", job.total_pages_found);
    println!("  Images found: {}", job.images_found);

    let images = coordinator.images(job.id)?;
    for image in images.iter().take(20) {
        println!("  - {} (on {})", image.image_url, image.page_url);
    }
    if images.len() > 20 {
        println!("  ... and {} more", images.len() - 20);
    }

    Ok(())
}
