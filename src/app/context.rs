//! Per-test-case context handed to scenario bodies.

use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use uuid::Uuid;

use crate::domain::{AppError, ConfigError, Network, WalletSdk};

use super::retry::RetryPolicy;
use super::wait::clamp_millis;

/// Destination used when no other address is configured
pub const DEFAULT_RECIPIENT: &str = "0x000000000000000000000000000000000000dEaD";

/// Token address the SDK treats as the chain's native currency
pub const NATIVE_TOKEN: &str = "0x0000000000000000000000000000000000000000";

/// Knobs shared by every scenario of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioSettings {
    pub recipient: String,
    pub transfer_value_wei: u128,
    pub receipt_poll_interval: Duration,
    pub receipt_timeout: Duration,
    pub history_page_size: i64,
    pub quote_token: String,
    pub quote_amount_wei: u128,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self {
            recipient: DEFAULT_RECIPIENT.to_string(),
            // 0.000001 ETH
            transfer_value_wei: 1_000_000_000_000,
            receipt_poll_interval: Duration::from_secs(2),
            receipt_timeout: Duration::from_secs(60),
            history_page_size: 20,
            quote_token: NATIVE_TOKEN.to_string(),
            // 0.001 ETH
            quote_amount_wei: 1_000_000_000_000_000,
        }
    }
}

impl ScenarioSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, keeping defaults for anything unset.
    ///
    /// A value that is set but does not parse is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let text = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            recipient: text("RECIPIENT_ADDRESS").unwrap_or(defaults.recipient),
            transfer_value_wei: parse_var(&text, "TRANSFER_VALUE_WEI")?
                .unwrap_or(defaults.transfer_value_wei),
            receipt_poll_interval: parse_var::<i64>(&text, "RECEIPT_POLL_INTERVAL_MS")?
                .map(clamp_millis)
                .unwrap_or(defaults.receipt_poll_interval),
            receipt_timeout: parse_var::<i64>(&text, "RECEIPT_TIMEOUT_MS")?
                .map(clamp_millis)
                .unwrap_or(defaults.receipt_timeout),
            history_page_size: parse_var(&text, "HISTORY_PAGE_SIZE")?
                .unwrap_or(defaults.history_page_size),
            quote_token: text("QUOTE_TOKEN").unwrap_or(defaults.quote_token),
            quote_amount_wei: parse_var(&text, "QUOTE_AMOUNT_WEI")?
                .unwrap_or(defaults.quote_amount_wei),
        })
    }

    /// Network quotes are requested towards when starting from `from`
    #[must_use]
    pub fn quote_destination(&self, from: Network) -> Network {
        match from {
            Network::Optimism => Network::Xdai,
            Network::Xdai => Network::Optimism,
            Network::Goerli => Network::Mumbai,
            Network::Mumbai => Network::Goerli,
        }
    }
}

fn parse_var<T: FromStr>(
    text: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    text(name)
        .map(|value| {
            value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                value,
            })
        })
        .transpose()
}

/// Everything one attempt of a test case works with.
///
/// Built fresh for every attempt, so no SDK state or notes leak between
/// test cases or between retries of the same case.
pub struct ScenarioContext {
    pub run_id: Uuid,
    pub network: Network,
    pub sdk: Arc<dyn WalletSdk>,
    pub settings: Arc<ScenarioSettings>,
    /// Policy for individual SDK calls; retries transient failures only
    pub io_policy: RetryPolicy,
    notes: Mutex<Vec<String>>,
}

impl ScenarioContext {
    #[must_use]
    pub fn new(
        run_id: Uuid,
        network: Network,
        sdk: Arc<dyn WalletSdk>,
        settings: Arc<ScenarioSettings>,
        io_policy: RetryPolicy,
    ) -> Self {
        Self {
            run_id,
            network,
            sdk,
            settings,
            io_policy,
            notes: Mutex::new(Vec::new()),
        }
    }

    /// Run one SDK call under the I/O retry policy
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        self.io_policy
            .run_if(operation, AppError::is_transient)
            .await
            .map_err(AppError::from)
    }

    /// Attach a diagnostic line to the test case's report entry
    pub fn note(&self, line: impl Into<String>) {
        self.notes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.into());
    }

    pub fn take_notes(&self) -> Vec<String> {
        std::mem::take(&mut *self.notes.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_settings_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("RECIPIENT_ADDRESS", "0x1111111111111111111111111111111111111111"),
            ("TRANSFER_VALUE_WEI", "42"),
            ("RECEIPT_POLL_INTERVAL_MS", "-10"),
            ("RECEIPT_TIMEOUT_MS", "5000"),
            ("HISTORY_PAGE_SIZE", " "),
            ("QUOTE_TOKEN", "  "),
        ]);
        let settings =
            ScenarioSettings::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(settings.recipient, "0x1111111111111111111111111111111111111111");
        assert_eq!(settings.transfer_value_wei, 42);
        assert_eq!(settings.receipt_poll_interval, Duration::ZERO);
        assert_eq!(settings.receipt_timeout, Duration::from_secs(5));
        assert_eq!(settings.history_page_size, 20);
        assert_eq!(settings.quote_token, NATIVE_TOKEN);
    }

    #[test]
    fn test_settings_reject_malformed_numbers() {
        let result = ScenarioSettings::from_lookup(|k| {
            (k == "HISTORY_PAGE_SIZE").then(|| "oops".to_string())
        });

        match result {
            Err(ConfigError::InvalidValue { name, value }) => {
                assert_eq!(name, "HISTORY_PAGE_SIZE");
                assert_eq!(value, "oops");
            }
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_settings_default_when_unset() {
        let settings = ScenarioSettings::from_lookup(|_| None).unwrap();
        assert_eq!(settings, ScenarioSettings::default());
    }

    #[test]
    fn test_quote_destination_never_matches_source() {
        let settings = ScenarioSettings::default();
        for network in Network::ALL {
            assert_ne!(settings.quote_destination(network), network);
        }
    }
}
