#![allow(clippy::uninlined_format_args)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use competitor_sync_lib::application::housekeeping::Housekeeper;
use competitor_sync_lib::application::sync_service::{SyncRequest, SyncRunner, SyncService};
use competitor_sync_lib::domain::repositories::CatalogRepository;
use competitor_sync_lib::infrastructure::config::{AppConfig, ConfigManager, ConfigPurpose};
use competitor_sync_lib::infrastructure::http_api::{self, AppState};
use competitor_sync_lib::infrastructure::portal::{
    PortalLogin, ReportClient, ReportService, ReportSource, UnconfiguredReports,
};
use competitor_sync_lib::infrastructure::{
    DatabaseConnection, SqliteCatalogRepository, VendorApiClient, init_logging_with_config, logging,
    scheduler,
};

#[derive(Parser)]
#[command(
    name = "competitor-sync",
    version,
    about = "Vendor catalog sync with price and inventory history"
)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one sync to completion and print the report
    Sync {
        #[arg(long)]
        start_offset: Option<u64>,
        /// Upper bound of the offset range (vendor count when omitted)
        #[arg(long)]
        total: Option<u64>,
    },
    /// Serve the HTTP API (and the daily schedule when enabled)
    Serve,
    /// Report same-day history duplicates; prune them with --apply
    Dedupe {
        #[arg(long)]
        apply: bool,
    },
    /// Print the configuration file location
    ConfigPath,
}

async fn load_config(cli: &Cli) -> Result<(ConfigManager, AppConfig)> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = manager.initialize_on_first_run().await?;
    config.apply_env()?;
    Ok((manager, config))
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn CatalogRepository>> {
    let db = DatabaseConnection::new(&config.store.database_url, config.store.max_connections)
        .await
        .context("Failed to open catalog store")?;
    db.migrate().await?;
    Ok(Arc::new(SqliteCatalogRepository::new(db.pool().clone())))
}

async fn build_service(config: &AppConfig) -> Result<Arc<SyncService>> {
    let transport = Arc::new(VendorApiClient::new(&config.vendor)?);
    let repository = open_store(config).await?;
    Ok(Arc::new(SyncService::new(transport, repository, config.sync_settings())))
}

fn build_reports(config: &AppConfig) -> Result<Arc<dyn ReportSource>> {
    match PortalLogin::from_config(&config.portal)? {
        Some(login) => Ok(Arc::new(ReportService::new(
            Arc::new(login),
            ReportClient::from_config(&config.portal)?,
        ))),
        None => {
            warn!("⚠️  Portal credentials not configured, CSV reports are unavailable");
            Ok(Arc::new(UnconfiguredReports))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if let Command::ConfigPath = cli.command {
        let manager = match &cli.config {
            Some(path) => ConfigManager::with_path(path),
            None => ConfigManager::new()?,
        };
        println!("{}", manager.config_path().display());
        return Ok(());
    }

    let (manager, config) = load_config(&cli).await?;
    init_logging_with_config(&config.logging)?;
    logging::log_system_info();
    info!("⚙️  Configuration: {}", manager.config_path().display());

    match cli.command {
        Command::Sync { start_offset, total } => {
            config.validate(ConfigPurpose::Sync)?;
            let service = build_service(&config).await?;
            let report = service.run(SyncRequest { start_offset, total }).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Serve => {
            config.validate(ConfigPurpose::Serve)?;
            let runner = Arc::new(SyncRunner::new(build_service(&config).await?));
            let token = config.server.auth_token.clone().unwrap_or_default();
            let state = AppState::new(
                runner.clone(),
                build_reports(&config)?,
                token,
                config.server.rate_limit_per_minute,
            );

            let schedule = config
                .schedule
                .enabled
                .then(|| scheduler::spawn_daily(runner, config.schedule.hour_utc));
            let served = http_api::serve(&config.server.bind_address, state).await;
            if let Some(handle) = schedule {
                handle.abort();
            }
            served?;
        }
        Command::Dedupe { apply } => {
            config.validate(ConfigPurpose::Maintenance)?;
            let repository = open_store(&config).await?;
            let duplicates = repository.duplicate_part_numbers().await?;
            for (part_number, rows) in &duplicates {
                warn!("🔁 Part number {} is stored {} times", part_number, rows);
            }
            let report = Housekeeper::new(repository).same_day_duplicates(apply).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !apply && !report.affected_parts.is_empty() {
                info!("Dry run only; re-run with --apply to prune");
            }
        }
        Command::ConfigPath => {}
    }

    Ok(())
}
