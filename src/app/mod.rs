//! Application layer: retry core, waiting, scenarios and the report loader.

pub mod context;
pub mod loader;
pub mod retry;
pub mod runner;
pub mod scenarios;
pub mod wait;

pub use context::{ScenarioContext, ScenarioSettings};
pub use loader::{BenchmarkLoader, LoaderConfig};
pub use retry::{Backoff, DEFAULT_MAX_ATTEMPTS, RetryError, RetryPolicy, retry};
pub use runner::{SuiteRunner, default_io_policy, plan_for};
pub use scenarios::{Scenario, ScenarioOutcome};
pub use wait::{MIN_POLL_INTERVAL, clamp_millis, poll_until, sleep_for, sleep_ms};
