//! tenantclone - clone one organization's dataset into another organization.
//!
//! Connects to PostgreSQL, runs a single clone job in-process, and prints the
//! finished job as JSON on stdout. Logs go to stderr (or `LOG_FILE`).

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use tenantclone_db::{
    log_pool_metrics, CloneAuditRepository, CloneDestination, Database, EntityStore,
    OrganizationId, PoolConfig,
};
use tenantclone_engine::{
    default_catalog, CancelHandle, CloneOptions, CloneOrchestrator, ClonePlan, EngineConfig,
};

#[derive(Parser)]
#[command(name = "tenantclone")]
#[command(author, version, about = "Clone an organization's dataset into another organization")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone a source organization
    Clone {
        /// Source organization id
        #[arg(long)]
        source: Uuid,

        /// Existing destination organization id
        #[arg(long, conflicts_with = "name", required_unless_present = "name")]
        destination: Option<Uuid>,

        /// Name for a new destination organization (2-50 characters)
        #[arg(long)]
        name: Option<String>,

        /// Seed for the suffix appended to unique names and slugs
        #[arg(long)]
        suffix_seed: Option<String>,

        /// Skip the post-clone verification pass
        #[arg(long)]
        no_verify: bool,

        /// JSON file of entity type descriptors (default: built-in catalog)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Record the finished job in the clone_job_audit table
        #[arg(long)]
        audit: bool,

        /// Email recorded on a newly created destination organization
        #[arg(long)]
        created_by: Option<String>,
    },

    /// Print the validated clone order
    Plan {
        /// JSON file of entity type descriptors (default: built-in catalog)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// List audited clone jobs of a source organization
    Jobs {
        /// Source organization id
        #[arg(long)]
        source: Uuid,
    },

    /// Create or update the clone_job_audit table
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: tenantclone crates at info)
fn init_tracing() -> Option<WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "tenantclone_cli=info,tenantclone_engine=info,tenantclone_db=info".into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    if let Some(ref path) = log_file {
        let file_dir = Path::new(path).parent().unwrap_or(Path::new("."));
        let file_name = Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("tenantclone.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // stdout carries the job JSON
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Clone {
            source,
            destination,
            name,
            suffix_seed,
            no_verify,
            catalog,
            audit,
            created_by,
        } => {
            let destination = match (destination, name) {
                (Some(id), _) => CloneDestination::Existing(OrganizationId::new(id)),
                (None, Some(name)) => CloneDestination::New { name },
                (None, None) => anyhow::bail!("Either --destination or --name is required"),
            };
            let plan = load_plan(catalog.as_deref())?;

            let mut options = CloneOptions::new();
            if no_verify {
                options = options.with_verify(false);
            }
            if let Some(seed) = suffix_seed {
                options = options.with_suffix_seed(seed);
            }
            if let Some(email) = created_by {
                options = options.with_created_by(email);
            }

            cmd_clone(OrganizationId::new(source), destination, plan, options, audit).await
        }
        Commands::Plan { catalog } => {
            let plan = load_plan(catalog.as_deref())?;
            for (i, entity) in plan.entries().iter().enumerate() {
                println!("{:>3}. {:<28} {}", i + 1, entity.name, entity.table);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Jobs { source } => {
            let db = connect(PoolConfig::from_env()).await?;
            let jobs = db
                .audit
                .list_for_source(OrganizationId::new(source))
                .await?;
            println!("{}", serde_json::to_string_pretty(&jobs)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Migrate => {
            let db = connect(PoolConfig::from_env()).await?;
            db.migrate().await?;
            info!("Database migrations complete");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn cmd_clone(
    source: OrganizationId,
    destination: CloneDestination,
    plan: ClonePlan,
    options: CloneOptions,
    audit: bool,
) -> anyhow::Result<ExitCode> {
    let config = EngineConfig::from_env();
    let db =
        connect(PoolConfig::from_env().with_row_workers(config.max_concurrent_rows)).await?;
    let store: Arc<dyn EntityStore> = Arc::new(db.entities.clone());
    let mut orchestrator = CloneOrchestrator::new(store, plan, config);
    if audit {
        orchestrator = orchestrator.with_audit(Arc::new(db.audit.clone()));
    }

    let cancel = CancelHandle::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current entity type");
                cancel.cancel();
            }
        })
    };

    let job = orchestrator
        .clone_organization(source, destination, options.with_cancel(cancel))
        .await;
    interrupt.abort();
    log_pool_metrics(db.pool());

    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(if job.status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn load_plan(catalog: Option<&Path>) -> anyhow::Result<ClonePlan> {
    let plan = match catalog {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read catalog {}", path.display()))?;
            ClonePlan::from_json(&json)?
        }
        None => ClonePlan::new(default_catalog())?,
    };
    Ok(plan)
}

async fn connect(pool: PoolConfig) -> anyhow::Result<Database> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    info!("Connecting to database...");
    let db = Database::connect_with_config(&database_url, pool).await?;
    info!("Database connected");
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_clone_requires_a_destination() {
        let source = Uuid::new_v4().to_string();
        assert!(Cli::try_parse_from(["tenantclone", "clone", "--source", &source]).is_err());
        assert!(Cli::try_parse_from([
            "tenantclone",
            "clone",
            "--source",
            &source,
            "--name",
            "Copy",
            "--destination",
            &Uuid::new_v4().to_string(),
        ])
        .is_err());

        let cli =
            Cli::try_parse_from(["tenantclone", "clone", "--source", &source, "--name", "Copy"])
                .unwrap();
        match cli.command {
            Commands::Clone {
                name, no_verify, ..
            } => {
                assert_eq!(name.as_deref(), Some("Copy"));
                assert!(!no_verify);
            }
            _ => panic!("expected clone command"),
        }
    }

    #[test]
    fn test_load_builtin_plan() {
        let plan = load_plan(None).unwrap();
        assert_eq!(plan.len(), default_catalog().len());
    }

    #[test]
    fn test_load_missing_catalog_file() {
        let err = load_plan(Some(Path::new("/nonexistent/catalog.json"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read catalog"));
    }
}
