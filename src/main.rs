use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use coach_tracker::api::{create_api, AnalysisApi};
use coach_tracker::credentials;
use coach_tracker::tracker::{ChannelObserver, LoggingObserver, ObserverSet};
use coach_tracker::{follow, AnalysisJobRegistry, AnalysisStatus, Config, StartOutcome};

#[derive(Parser)]
#[command(name = "coach-tracker")]
#[command(version, author = "TigreRoll")]
#[command(about = "Start and follow Presentation Coach video analysis")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the standard search paths)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override the backend base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Bearer token to use instead of the configured sources
    #[arg(long, global = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start analysis of a session and follow it until it finishes
    Analyze {
        /// Session identifier
        #[arg(short, long)]
        session: String,
    },
    /// List sessions that have a video, newest first
    List {
        /// Keep following every session that is still processing
        #[arg(short, long)]
        watch: bool,
    },
    /// Delete a session
    Delete {
        /// Session identifier
        #[arg(short, long)]
        session: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(&path.to_string_lossy())?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };

    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        config.output.log_level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("coach_tracker={},warn", log_level))),
        )
        .init();

    if let Some(base_url) = cli.base_url {
        config.api.base_url = base_url;
    }
    if let Some(token) = cli.token {
        config.auth.token = Some(token);
    }
    config.validate()?;
    debug!("{}", config.summary());

    let api: Arc<dyn AnalysisApi> = Arc::from(create_api(&config.api)?);
    let credentials = Arc::new(credentials::from_config(&config.auth));
    let (channel, mut events) = ChannelObserver::new();

    let registry = AnalysisJobRegistry::builder(api, credentials)
        .with_polling(&config.polling)
        .with_observer(ObserverSet::new(vec![
            Box::new(LoggingObserver),
            Box::new(channel),
        ]))
        .build();

    let check_every = config.polling.interval();

    match cli.command {
        Commands::Analyze { session } => {
            info!("🚀 Presentation Coach tracker starting...");
            let outcome = registry
                .start(&session, &AnalysisStatus::NotStarted, None)
                .await?;

            match outcome {
                StartOutcome::Started | StartOutcome::AlreadyRunning => {
                    info!("🔍 {}", outcome.message());
                    let summary =
                        follow(&registry, &mut events, vec![session], check_every).await;
                    if summary.failed > 0 {
                        return Err(anyhow!("Analysis failed"));
                    }
                }
                StartOutcome::AlreadyCompleted { .. } => {
                    info!("✅ {}", outcome.message());
                }
                StartOutcome::Failed(message) | StartOutcome::PreviouslyFailed(message) => {
                    return Err(anyhow!(message));
                }
                StartOutcome::AlreadyTracked | StartOutcome::Cancelled => {
                    warn!("{}", outcome.message());
                }
            }
        }

        Commands::List { watch } => {
            let sessions = registry.refresh().await?;

            if sessions.is_empty() {
                info!("📭 No sessions with a video found");
                return Ok(());
            }

            info!("📚 Found {} sessions:", sessions.len());
            for session in &sessions {
                let started = session
                    .started_at()
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "unknown time".to_string());
                let feedback = if session.is_analyzed() { "📝" } else { "  " };
                info!(
                    "{} {} - {} ({}) {}",
                    feedback,
                    session.id,
                    session.video_name().unwrap_or("-"),
                    started,
                    session.status()
                );
                if let Some(error) = session.analysis_error.as_deref() {
                    info!("    Error: {}", error);
                }
            }

            if watch {
                let active = registry.active_sessions().await;
                if active.is_empty() {
                    info!("Nothing is processing");
                } else {
                    info!("👀 Following {} processing session(s)", active.len());
                    let summary = follow(&registry, &mut events, active, check_every).await;
                    info!(
                        "📊 Completed: {}, failed: {}, stopped: {}",
                        summary.completed, summary.failed, summary.stopped
                    );
                    if summary.failed > 0 {
                        return Err(anyhow!("{} analysis job(s) failed", summary.failed));
                    }
                }
            }
        }

        Commands::Delete { session } => {
            registry.delete_session(&session).await?;
            info!("✅ Deleted session: {}", session);
        }
    }

    Ok(())
}
