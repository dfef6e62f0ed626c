mod cli;
mod commands;
mod crawl;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

// Use mimalloc to contain memory bloat: glibc malloc is reluctant to return
// memory to the OS under sustained crawl concurrency.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use fedimapper_core::config::AppConfig;

use crate::cli::{Cli, Commands};
use crate::crawl::run_crawl;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = toml::from_str(&config_str)?;

    apply_env_overrides(&mut config);

    match cli.command {
        Commands::Crawl { num_processes } => {
            if let Some(n) = num_processes {
                config.queue.num_processes = n;
            }
            run_crawl(config).await?;
        }
        Commands::IngestInstance { host } => {
            commands::instance::run_ingest(config, &host).await?;
        }
        Commands::Instance { host } => {
            commands::instance::show_metadata(config, &host).await?;
        }
        Commands::InstanceVersion { host } => {
            commands::instance::show_version(config, &host).await?;
        }
        Commands::InstancePeers { host } => {
            commands::instance::show_peers(config, &host).await?;
        }
        Commands::InstanceBlocks { host } => {
            commands::instance::show_blocks(config, &host).await?;
        }
        Commands::VacuumDatabase => {
            commands::vacuum::run(config).await?;
        }
    }

    Ok(())
}

/// Deployment knobs that are easier to flip per-container than per-file.
fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(v) = std::env::var("FEDIMAPPER_DATABASE_URL") {
        config.database.url = v;
    }
    if let Ok(v) = std::env::var("FEDIMAPPER_USER_AGENT") {
        config.crawler.user_agent = v;
    }
    if let Ok(v) = std::env::var("NUM_PROCESSES") {
        if let Ok(n) = v.parse::<usize>() {
            if n > 0 && n <= 128 {
                config.queue.num_processes = n;
            }
        }
    }
    if let Ok(v) = std::env::var("MAX_QUEUE_SIZE") {
        if let Ok(n) = v.parse::<usize>() {
            if n > 0 {
                config.queue.max_queue_size = n;
            }
        }
    }
    if let Ok(v) = std::env::var("MAX_JOBS_PER_PROCESS") {
        if let Ok(n) = v.parse::<usize>() {
            if n > 0 {
                config.queue.max_jobs_per_process = n;
            }
        }
    }
    if let Ok(v) = std::env::var("BOOTSTRAP_INSTANCES") {
        let hosts: Vec<String> = v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !hosts.is_empty() {
            config.crawler.bootstrap_instances = hosts;
        }
    }
    if let Ok(v) = std::env::var("EVIL_DOMAINS") {
        let domains: Vec<String> = v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !domains.is_empty() {
            config.crawler.evil_domains = domains;
        }
    }
}
