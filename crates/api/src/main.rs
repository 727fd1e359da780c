//! Gryork CLI - Main entry point

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gryork_api::{create_router, AppConfig, AppState};
use gryork_audit::{AuditCategory, AuditQuery, ExportFormat};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gryork")]
#[command(about = "Gryork - case lifecycle, SLA and bid service", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory path (overrides the configuration)
    #[arg(short, long, global = true)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server and the background scheduler
    Serve,

    /// Run one scheduler pass and print the report
    Tick,

    /// Export the audit log
    AuditExport {
        /// csv or json
        #[arg(long, default_value = "csv")]
        format: String,
        /// Only one category (CASE, SLA, BID)
        #[arg(long)]
        category: Option<String>,
        /// Output file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(data) = cli.data {
        config.data_dir = data;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let state = AppState::from_config(&config)?;

    match cli.command {
        Commands::Serve => serve(&config, state).await?,

        Commands::Tick => {
            let report = state.scheduler.run_once().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                tracing::warn!("Scheduler pass completed with failures");
            }
        }

        Commands::AuditExport {
            format,
            category,
            output,
        } => {
            let format: ExportFormat = format.parse()?;
            let category = category
                .map(|c| c.to_uppercase().parse::<AuditCategory>())
                .transpose()
                .context("unknown audit category (expected CASE, SLA or BID)")?;
            let query = AuditQuery {
                category,
                ..Default::default()
            };
            let body = state.audit.export(&query, format)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, body)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("📄 Audit log written to {}", path.display());
                }
                None => print!("{}", body),
            }
        }
    }

    Ok(())
}

async fn serve(config: &AppConfig, state: AppState) -> Result<()> {
    let scheduler = state.scheduler.clone().start();
    let app = create_router(state);

    let addr = config.bind_address();
    tracing::info!("🚀 Gryork API starting at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    scheduler.stop().await;
    Ok(())
}
