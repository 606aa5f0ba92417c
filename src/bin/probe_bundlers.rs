//! Probe every configured bundler endpoint and print a JSON summary.
//!
//! Usage:
//!   BUNDLER_URL_GOERLI=https://... cargo run --bin probe_bundlers
//!
//! Retries are controlled by `PROBE_MAX_ATTEMPTS`, `PROBE_BACKOFF_MS`,
//! `PROBE_BACKOFF_MAX_MS`, `PROBE_ATTEMPT_TIMEOUT_MS` and `PROBE_DEADLINE_MS`.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use dotenvy::dotenv;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use prime_sdk_e2e::app::RetryPolicy;
use prime_sdk_e2e::domain::{AppError, Network};
use prime_sdk_e2e::infra::{BundlerEndpoints, BundlerProbe, ProbeReport};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct ProbeOutcome {
    network: Network,
    ok: bool,
    attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<ProbeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    // Logs go to stderr so stdout stays valid JSON
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

async fn probe_all(endpoints: &BundlerEndpoints, policy: &RetryPolicy) -> Result<Vec<ProbeOutcome>> {
    let probe = BundlerProbe::new(HTTP_TIMEOUT)?.with_api_key(endpoints.api_key.clone());
    let mut outcomes = Vec::new();

    for (network, url) in endpoints.iter() {
        let mut attempts = 0u32;
        let result = policy
            .run_if(
                || {
                    attempts += 1;
                    probe.probe(network, url)
                },
                AppError::is_transient,
            )
            .await;

        let outcome = match result {
            Ok(report) => ProbeOutcome {
                network,
                ok: true,
                attempts,
                report: Some(report),
                error: None,
            },
            Err(e) => {
                error!(%network, error = %e, "Bundler probe failed");
                ProbeOutcome {
                    network,
                    ok: false,
                    attempts,
                    report: None,
                    error: Some(e.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    init_tracing();

    let endpoints = BundlerEndpoints::from_env();
    if endpoints.is_empty() {
        warn!("No BUNDLER_URL_<NETWORK> variables set, nothing to probe");
        return ExitCode::FAILURE;
    }
    let policy = RetryPolicy::from_env("PROBE");
    info!(
        endpoints = endpoints.urls.len(),
        max_attempts = policy.max_attempts(),
        "Probing bundlers"
    );

    let outcomes = match probe_all(&endpoints, &policy).await {
        Ok(outcomes) => outcomes,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&outcomes) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!(error = %e, "Failed to serialize probe summary");
            return ExitCode::FAILURE;
        }
    }

    if outcomes.iter().all(|o| o.ok) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
