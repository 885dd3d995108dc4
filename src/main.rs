//! Seine command-line interface
//!
//! Runs a crawl job described by a TOML job file, streams progress, and
//! prints a summary or the full JSON result.

use clap::Parser;
use std::path::PathBuf;

use seine::config::load_job_file;
use seine::crawler::{JobEvent, JobEvents, JobOutput, JobRegistry, MultiJobEvent};
use seine::output::{render_multi_summary, render_summary};
use tracing_subscriber::EnvFilter;

/// Seine: a polite breadth-first web crawler and scraper
///
/// Seine crawls from seed URLs while honoring robots.txt, adapting per-host
/// request delays, and bounding depth. Jobs are described by a TOML file
/// with a [job] table (single scope) or a [multi] table (multi-scope).
#[derive(Parser, Debug)]
#[command(name = "seine")]
#[command(version)]
#[command(about = "A polite breadth-first web crawler and scraper", long_about = None)]
struct Cli {
    /// Path to the TOML job file
    #[arg(value_name = "JOBFILE")]
    job_file: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Print the full result as JSON instead of a summary
    #[arg(long)]
    json: bool,

    /// Validate the job file and show what would be crawled, then exit
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading job file: {}", cli.job_file.display());
    let job_file = load_job_file(&cli.job_file)?;

    if cli.dry_run {
        handle_dry_run(&job_file);
        return Ok(());
    }

    let registry = JobRegistry::from_env();
    let show_progress = !cli.quiet && !cli.json;

    if let Some(spec) = job_file.job {
        let job_id = registry.start_job(spec)?;
        stream_progress(&registry, &job_id, show_progress).await?;
        registry.wait(&job_id).await?;

        match registry.get_result(&job_id)? {
            JobOutput::Single(result) => {
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                } else {
                    print!("{}", render_summary(&result));
                }
            }
            JobOutput::Multi(_) => unreachable!("single job returned multi result"),
        }
    } else if let Some(spec) = job_file.multi {
        let info = registry.start_multi_job(spec)?;
        for warning in &info.warnings {
            tracing::warn!("{}", warning);
        }
        stream_progress(&registry, &info.job_id, show_progress).await?;
        registry.wait(&info.job_id).await?;

        match registry.get_result(&info.job_id)? {
            JobOutput::Multi(result) => {
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                } else {
                    print!("{}", render_multi_summary(&result));
                }
            }
            JobOutput::Single(_) => unreachable!("multi job returned single result"),
        }
    }

    Ok(())
}

/// Sets up the tracing subscriber from verbosity flags and LOG_LEVEL/DEBUG
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if let Ok(level) = std::env::var("LOG_LEVEL") {
        EnvFilter::new(level.to_lowercase())
    } else if std::env::var("DEBUG").map(|v| v == "true").unwrap_or(false) {
        EnvFilter::new("seine=debug,info")
    } else {
        match verbose {
            0 => EnvFilter::new("seine=info,warn"),
            1 => EnvFilter::new("seine=debug,info"),
            2 => EnvFilter::new("seine=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Prints per-page progress lines until the job reaches a terminal event
async fn stream_progress(
    registry: &JobRegistry,
    job_id: &str,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !show {
        return Ok(());
    }

    match registry.subscribe(job_id)? {
        JobEvents::Single(mut rx) => {
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    match event {
                        JobEvent::PageComplete { data } => {
                            println!(
                                "[{}] depth={} links={} {}",
                                data.status.as_str(),
                                data.depth,
                                data.links_found,
                                data.url
                            );
                        }
                        JobEvent::StatusUpdate { data } => {
                            tracing::debug!(
                                "progress: {}/{} processed, depth {}",
                                data.urls_processed,
                                data.urls_discovered,
                                data.current_depth
                            );
                        }
                        JobEvent::JobCompleted { .. }
                        | JobEvent::JobFailed { .. }
                        | JobEvent::JobCancelled { .. } => break,
                        _ => {}
                    }
                }
            });
        }
        JobEvents::Multi(mut rx) => {
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    match event {
                        MultiJobEvent::PageComplete { data } => {
                            let prefix = data.matched_prefix.as_deref().unwrap_or("/");
                            println!(
                                "[{}] depth={} scope={} {}",
                                data.status.as_str(),
                                data.depth,
                                prefix,
                                data.url
                            );
                        }
                        MultiJobEvent::ScopeCompleted { data } => {
                            let name = data.scope_name.as_deref().unwrap_or("?");
                            println!(
                                "scope '{}' {}: {} pages",
                                name,
                                data.state.as_str(),
                                data.urls_processed
                            );
                        }
                        MultiJobEvent::JobCompleted { .. }
                        | MultiJobEvent::JobFailed { .. }
                        | MultiJobEvent::JobCancelled { .. } => break,
                        _ => {}
                    }
                }
            });
        }
    }

    Ok(())
}

/// Validates the job file and prints what would be crawled
fn handle_dry_run(job_file: &seine::config::JobFile) {
    println!("=== Seine Dry Run ===\n");

    if let Some(job) = &job_file.job {
        println!("Single-scope job:");
        println!("  Mode: {}", job.mode.as_str());
        println!("  Max depth: {}", job.max_depth);
        println!("  Workers: {}", job.worker_count);
        println!("  Allow subdomains: {}", job.allow_subdomains);
        println!("  Include child pages: {}", job.include_child_pages);
        println!("  Seeds ({}):", job.seed_urls.len());
        for seed in &job.seed_urls {
            println!("    - {}", seed);
        }
        if !job.allowed_domains.is_empty() {
            println!("  Additional domains:");
            for domain in &job.allowed_domains {
                println!("    - {}", domain);
            }
        }
    }

    if let Some(multi) = &job_file.multi {
        println!("Multi-scope job:");
        println!("  Domain: {}", multi.domain);
        println!("  Mode: {}", multi.mode.as_str());
        println!("  Max depth: {}", multi.max_depth);
        println!("  Workers (global): {}", multi.worker_count);
        println!("  Parallel scopes: {}", multi.parallel_scopes);
        println!("  Auto-discover prefixes: {}", multi.auto_discover_prefixes);
        println!("  Scopes ({}):", multi.scopes.len());
        for scope in &multi.scopes {
            let marker = if scope.active { "" } else { " (inactive)" };
            println!("    - {} [{}]{}", scope.name, scope.id, marker);
            for entry in &scope.entry_urls {
                println!("        {}", entry);
            }
        }
    }

    println!("\n✓ Job file is valid");
}
