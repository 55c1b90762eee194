//! wds - web UI deployment from build artifacts
//!
//! Usage:
//!   wds deploy <keys>...         # Deploy artifacts into the target
//!   wds check-versions <keys>... # Warn about downgrades
//!   wds versions                 # Show deployed versions
//!   wds version-history          # Show recent artifact versions per game
//!   wds history                  # Show recent deployments
//!   wds list-entries <key>       # List files inside an archive

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wds_deploy::{
    DeployError, DeployOrchestrator, DeploymentOptions, DeploymentReport, JsonHistoryFile,
    VersionCache, VersionGuard, archive,
};
use wds_object_store::{DirStore, ObjectStore};
use wds_protocol::{
    DeployRequest, DeployStatus, ProgressEvent, VersionCheckRequest, VersionCheckResponse,
    VersionWarning,
};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "wds", version)]
#[command(about = "Deploy versioned web UI build artifacts", long_about = None)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/wds/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Source artifact directory
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Target directory served as the web UI
    #[arg(long, global = true)]
    target: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy artifacts into the target
    Deploy {
        /// Artifact keys relative to the source, e.g. 20251003/event-b-prd-1.0.6.zip
        #[arg(required = true)]
        keys: Vec<String>,

        /// Keep existing files under the target prefixes
        #[arg(long)]
        no_clear: bool,

        /// Upload archives as-is instead of extracting them
        #[arg(long)]
        no_extract: bool,

        /// Deploy every artifact under this prefix instead of per-game directories
        #[arg(long)]
        prefix: Option<String>,

        /// Record the run as a rollback
        #[arg(long)]
        rollback: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Warn about artifacts older than the deployed version
    CheckVersions {
        #[arg(required = true)]
        keys: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// Show the deployed version of every game directory
    Versions {
        #[arg(long)]
        json: bool,
    },

    /// Show the latest artifact versions of every game in the source
    VersionHistory {
        #[arg(long)]
        json: bool,
    },

    /// Show recent deployments, newest first
    History {
        /// Number of records to show
        #[arg(long, short = 'n', default_value_t = 10)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// List the files inside an archive artifact
    ListEntries {
        key: String,

        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,wds=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut cfg = AppConfig::load(cli.config.as_deref())?;
    if let Some(source) = cli.source {
        cfg.source_dir = source;
    }
    if let Some(target) = cli.target {
        cfg.target_dir = target;
    }

    match cli.command {
        Commands::Deploy {
            keys,
            no_clear,
            no_extract,
            prefix,
            rollback,
            json,
        } => {
            let mut request = DeployRequest {
                artifact_keys: keys,
                clear_before: cfg.defaults.clear_before_deploy && !no_clear,
                extract_zip: cfg.defaults.extract_archives && !no_extract,
                custom_prefix: prefix.unwrap_or_else(|| cfg.defaults.custom_prefix.clone()),
                is_rollback: rollback,
            };
            request.validate()?;
            deploy(&cfg, request, json).await
        }
        Commands::CheckVersions { keys, json } => {
            let request = VersionCheckRequest { artifact_keys: keys };
            let warnings = version_guard(&cfg)
                .check_versions(&request.artifact_keys)
                .await;
            if json {
                print_json(&VersionCheckResponse::from(warnings))?;
            } else if warnings.is_empty() {
                println!("no version warnings");
            } else {
                print_warnings(&warnings);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Versions { json } => {
            let versions = version_guard(&cfg)
                .deployed_versions()
                .await
                .context("failed to list deployed versions")?;
            if json {
                print_json(&versions)?;
            } else {
                for v in &versions {
                    println!("{}\t{}", v.game, v.version);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::VersionHistory { json } => {
            let source = DirStore::new(&cfg.source_dir);
            let games = version_guard(&cfg)
                .version_history(&source)
                .await
                .context("failed to build version history")?;
            if json {
                print_json(&games)?;
            } else {
                for game in &games {
                    let deployed = game.currently_deployed.as_deref().unwrap_or("-");
                    println!("{} (deployed {deployed})", game.name);
                    for v in &game.versions {
                        let latest = if v.is_latest { " latest" } else { "" };
                        let current = if v.is_deployed { " deployed" } else { "" };
                        println!("  {:<12} {}{latest}{current}", v.version, v.artifact_key);
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::History { limit, json } => {
            let history = history_file(&cfg);
            let records: Vec<_> = history
                .load()
                .await
                .with_context(|| format!("failed to read {}", history.path().display()))?
                .into_iter()
                .take(limit)
                .collect();
            if json {
                print_json(&records)?;
            } else {
                for r in &records {
                    let rollback = if r.is_rollback { " (rollback)" } else { "" };
                    println!(
                        "{}  {:<15} {:>5} files  {}{}",
                        r.timestamp,
                        r.status.as_str(),
                        r.files_deployed,
                        r.artifact_keys.join(", "),
                        rollback
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::ListEntries { key, json } => {
            let source = DirStore::new(&cfg.source_dir);
            let data = source
                .get(&key)
                .await
                .with_context(|| format!("failed to read {key}"))?;
            let entries = archive::list_entries(&data)?;
            if json {
                let rows: Vec<_> = entries
                    .iter()
                    .map(|e| {
                        serde_json::json!({
                            "name": e.name,
                            "size": e.size,
                            "compressedSize": e.compressed_size,
                            "crc32": e.crc32,
                        })
                    })
                    .collect();
                print_json(&rows)?;
            } else {
                for e in &entries {
                    println!("{:>10}  {}", e.size, e.name);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn history_file(cfg: &AppConfig) -> JsonHistoryFile {
    JsonHistoryFile::new(&cfg.history_file, env!("CARGO_PKG_VERSION")).with_cap(cfg.history_cap)
}

fn version_guard(cfg: &AppConfig) -> VersionGuard {
    let target: Arc<dyn ObjectStore> = Arc::new(DirStore::new(&cfg.target_dir));
    let cache = Arc::new(VersionCache::new(cfg.pipeline.version_cache_ttl()));
    VersionGuard::new(target, cache, &cfg.pipeline)
}

async fn deploy(cfg: &AppConfig, request: DeployRequest, json: bool) -> Result<ExitCode> {
    let source: Arc<dyn ObjectStore> = Arc::new(DirStore::new(&cfg.source_dir));
    let target: Arc<dyn ObjectStore> = Arc::new(DirStore::new(&cfg.target_dir));
    let cache = Arc::new(VersionCache::new(cfg.pipeline.version_cache_ttl()));

    // Advisory only: the deployment proceeds regardless.
    let guard = VersionGuard::new(Arc::clone(&target), Arc::clone(&cache), &cfg.pipeline);
    let warnings = guard.check_versions(&request.artifact_keys).await;
    if !warnings.is_empty() {
        print_warnings(&warnings);
    }

    let history = Arc::new(history_file(cfg));
    let mut orch = DeployOrchestrator::new(source, target, cfg.pipeline.clone())
        .with_history(history)
        .with_version_cache(cache);
    if let Some(operator) = operator_name() {
        orch = orch.with_operator(operator);
    }

    let mut events = orch
        .take_events()
        .context("progress receiver already taken")?;
    let forwarder = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            render_progress(&event);
        }
    });

    let cancel = orch.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling deployment");
            cancel.cancel();
        }
    });

    let options = DeploymentOptions::from(&request);
    let result = orch.deploy(request.artifact_keys, options).await;
    interrupt.abort();
    // The channel closes once the orchestrator is gone.
    let _ = forwarder.await;

    match result {
        Ok(report) => {
            print_report(&report, json)?;
            Ok(exit_code(&report))
        }
        Err(DeployError::Aborted { report, source }) => {
            error!(error = %source, "deployment aborted");
            print_report(&report, json)?;
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

fn exit_code(report: &DeploymentReport) -> ExitCode {
    if report.status == DeployStatus::Failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn operator_name() -> Option<String> {
    hostname::get()
        .ok()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}

fn render_progress(event: &ProgressEvent) {
    let active = event
        .artifacts
        .iter()
        .filter(|a| a.status.is_active())
        .count();
    let finished = event
        .artifacts
        .iter()
        .filter(|a| a.status.is_terminal())
        .count();
    info!(
        phase = ?event.phase,
        percentage = event.percentage,
        active,
        finished,
        "{}",
        event.message
    );
}

fn print_warnings(warnings: &[VersionWarning]) {
    for w in warnings {
        println!(
            "warning: {} artifact {} is version {}, older than deployed {}",
            w.game_name, w.artifact_key, w.artifact_version, w.deployed_version
        );
    }
}

fn print_report(report: &DeploymentReport, json: bool) -> Result<()> {
    let response = report.to_response();
    if json {
        return print_json(&response);
    }

    println!("deployment {} {}", report.id, response.status);
    println!("  files uploaded: {}", response.total_files);
    println!("  files deleted:  {}", response.deleted_count);
    println!("  duration:       {}", response.duration);
    if !report.is_success() {
        println!(
            "  failed:         {} of {} artifacts",
            response.errors.len(),
            report.artifact_keys.len()
        );
    }
    for e in &response.errors {
        println!("  failed: {}: {}", e.artifact, e.error);
    }
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
