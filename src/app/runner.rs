//! Sequential runner for (network, scenario) test cases.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    AppError, Network, ScenarioResult, ScenarioStatus, SuiteReport, WalletSdkFactory,
};

use super::context::{ScenarioContext, ScenarioSettings};
use super::retry::{Backoff, DEFAULT_MAX_ATTEMPTS, RetryPolicy};
use super::scenarios::{Scenario, ScenarioOutcome};

/// I/O policy used when none is configured: a few quick retries
#[must_use]
pub fn default_io_policy() -> RetryPolicy {
    RetryPolicy::new(3).with_backoff(Backoff::Exponential {
        base: Duration::from_millis(250),
        max: Duration::from_secs(4),
        jitter: true,
    })
}

/// Every scenario on every network, network-major
#[must_use]
pub fn plan_for(networks: &[Network], scenarios: &[Scenario]) -> Vec<(Network, Scenario)> {
    networks
        .iter()
        .flat_map(|network| scenarios.iter().map(move |scenario| (*network, *scenario)))
        .collect()
}

/// Runs test cases one after another, each under the scenario retry policy
pub struct SuiteRunner {
    factory: Arc<dyn WalletSdkFactory>,
    settings: Arc<ScenarioSettings>,
    scenario_policy: RetryPolicy,
    io_policy: RetryPolicy,
}

impl SuiteRunner {
    #[must_use]
    pub fn new(factory: Arc<dyn WalletSdkFactory>, settings: ScenarioSettings) -> Self {
        Self {
            factory,
            settings: Arc::new(settings),
            scenario_policy: RetryPolicy::new(DEFAULT_MAX_ATTEMPTS),
            io_policy: default_io_policy(),
        }
    }

    /// Policy wrapped around each whole test case
    #[must_use]
    pub fn with_scenario_policy(mut self, policy: RetryPolicy) -> Self {
        self.scenario_policy = policy;
        self
    }

    /// Policy wrapped around each SDK call inside a test case
    #[must_use]
    pub fn with_io_policy(mut self, policy: RetryPolicy) -> Self {
        self.io_policy = policy;
        self
    }

    /// Run every case of `plan` in order and collect the report
    #[instrument(skip(self, plan), fields(cases = plan.len()))]
    pub async fn run(&self, plan: &[(Network, Scenario)]) -> SuiteReport {
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        info!(run_id = %run_id, "Starting suite run");

        let mut results = Vec::with_capacity(plan.len());
        for (network, scenario) in plan {
            results.push(self.run_case(run_id, *network, *scenario).await);
        }

        let report = SuiteReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            results,
        };
        info!(
            run_id = %run_id,
            passed = report.passed(),
            failed = report.failed(),
            skipped = report.skipped(),
            "Suite run finished"
        );
        report
    }

    /// Run one test case, retrying the whole body on any failure
    pub async fn run_case(
        &self,
        run_id: Uuid,
        network: Network,
        scenario: Scenario,
    ) -> ScenarioResult {
        let started = Instant::now();
        let mut attempts = 0u32;
        let notes = Mutex::new(Vec::new());

        let result = self
            .scenario_policy
            .run(|| {
                attempts += 1;
                let notes = &notes;
                async move {
                    notes.lock().unwrap_or_else(PoisonError::into_inner).clear();
                    let sdk = self.factory.connect(network).await?;
                    let ctx = ScenarioContext::new(
                        run_id,
                        network,
                        sdk,
                        Arc::clone(&self.settings),
                        self.io_policy.clone(),
                    );
                    ctx.call(|| ctx.sdk.health_check()).await?;
                    let outcome = scenario.execute(&ctx).await;
                    *notes.lock().unwrap_or_else(PoisonError::into_inner) = ctx.take_notes();
                    outcome
                }
            })
            .await;

        let (status, error_kind) = match result {
            Ok(ScenarioOutcome::Passed) => {
                info!(%network, %scenario, attempts, "Test case passed");
                (ScenarioStatus::Passed, None)
            }
            Ok(ScenarioOutcome::Skipped(reason)) => {
                warn!(%network, %scenario, reason = %reason, "Test case skipped");
                (ScenarioStatus::Skipped(reason), None)
            }
            Err(e) => {
                error!(%network, %scenario, attempts, error = %e, "Test case failed");
                let message = e.to_string();
                let kind = e
                    .into_last_error()
                    .map(|last: AppError| last.kind())
                    .unwrap_or("timeout");
                (ScenarioStatus::Failed(message), Some(kind.to_string()))
            }
        };

        ScenarioResult {
            network,
            scenario: scenario.to_string(),
            status,
            attempts,
            error_kind,
            notes: notes.into_inner().unwrap_or_else(PoisonError::into_inner),
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}
