//! Benchmark report loader entry point.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::{ExposeSecret, SecretString};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use prime_sdk_e2e::app::{BenchmarkLoader, LoaderConfig, RetryPolicy};
use prime_sdk_e2e::domain::BenchmarkStore;
use prime_sdk_e2e::infra::{PostgresClient, PostgresConfig};

/// Loader configuration
struct Config {
    database_url: SecretString,
    csv_path: PathBuf,
    run_migrations: bool,
    skip_invalid_rows: bool,
    insert_policy: RetryPolicy,
}

impl Config {
    fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .map(SecretString::from)
            .context("DATABASE_URL not set")?;
        let csv_path = env::args()
            .nth(1)
            .or_else(|| env::var("REPORT_CSV_PATH").ok())
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .context("No report given: pass a CSV path or set REPORT_CSV_PATH")?;
        let run_migrations = env::var("RUN_MIGRATIONS")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        let skip_invalid_rows = env::var("SKIP_INVALID_ROWS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        // LOADER_* overrides the insert policy only when an attempt budget is set
        let insert_policy = if env::var("LOADER_MAX_ATTEMPTS").is_ok() {
            RetryPolicy::from_env("LOADER")
        } else {
            LoaderConfig::default().insert_policy
        };

        Ok(Self {
            database_url,
            csv_path,
            run_migrations,
            skip_invalid_rows,
            insert_policy,
        })
    }
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    // LOG_FORMAT=json for machine-readable logs
    let json = env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

async fn run(config: Config) -> Result<()> {
    let client = PostgresClient::new(
        config.database_url.expose_secret(),
        PostgresConfig::default(),
    )
    .await
    .context("Failed to connect to PostgreSQL")?;

    if config.run_migrations {
        client.run_migrations().await?;
    }

    let store: Arc<dyn BenchmarkStore> = Arc::new(client);
    store.health_check().await?;

    let loader = BenchmarkLoader::with_config(
        Arc::clone(&store),
        LoaderConfig {
            skip_invalid_rows: config.skip_invalid_rows,
            insert_policy: config.insert_policy,
        },
    );

    info!(path = %config.csv_path.display(), "Loading benchmark report");
    let summary = loader
        .load_file(&config.csv_path)
        .await
        .with_context(|| format!("Failed to load {}", config.csv_path.display()))?;

    let total = store.count_benchmark_rows().await?;
    info!(
        inserted = summary.inserted,
        skipped = summary.skipped,
        total_rows = total,
        "Report stored"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    init_tracing();

    info!("Benchmark loader v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = run(config) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{:#}", e);
                ExitCode::FAILURE
            }
        },
        _ = shutdown_signal() => {
            warn!("Interrupted, report only partially loaded");
            ExitCode::from(130)
        }
    }
}
