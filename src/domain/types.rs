//! Domain types with validation support.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError as FieldError};

/// Networks the suite runs against
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Optimism,
    /// Gnosis chain
    Xdai,
    Goerli,
    Mumbai,
}

impl Network {
    pub const ALL: [Network; 4] = [Self::Optimism, Self::Xdai, Self::Goerli, Self::Mumbai];

    #[must_use]
    pub fn chain_id(&self) -> u64 {
        match self {
            Self::Optimism => 10,
            Self::Xdai => 100,
            Self::Goerli => 5,
            Self::Mumbai => 80001,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Optimism => "optimism",
            Self::Xdai => "xdai",
            Self::Goerli => "goerli",
            Self::Mumbai => "mumbai",
        }
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "optimism" => Ok(Self::Optimism),
            "xdai" | "gnosis" => Ok(Self::Xdai),
            "goerli" => Ok(Self::Goerli),
            "mumbai" => Ok(Self::Mumbai),
            _ => Err(format!("Invalid network: {}", s)),
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single call added to the pending user operation batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserOpTransaction {
    /// Destination address (0x-prefixed hex)
    pub to: String,
    /// Native value in wei
    pub value_wei: u128,
    /// Optional calldata (0x-prefixed hex)
    pub data: Option<String>,
}

impl UserOpTransaction {
    #[must_use]
    pub fn native_transfer(to: impl Into<String>, value_wei: u128) -> Self {
        Self {
            to: to.into(),
            value_wei,
            data: None,
        }
    }
}

/// The SDK's pending batch after an add
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserOpBatch {
    pub transactions: Vec<UserOpTransaction>,
}

impl UserOpBatch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Sum of the native value carried by the batch
    #[must_use]
    pub fn total_value_wei(&self) -> u128 {
        self.transactions
            .iter()
            .fold(0u128, |acc, tx| acc.saturating_add(tx.value_wei))
    }
}

/// A user operation as returned by fee estimation, ready to be sent.
///
/// Numeric fields are kept as the strings the SDK returns them as.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EstimatedUserOp {
    pub sender: String,
    pub nonce: String,
    pub call_data: String,
    pub call_gas_limit: String,
    pub verification_gas_limit: String,
    pub pre_verification_gas: String,
    pub max_fee_per_gas: String,
    pub max_priority_fee_per_gas: String,
    pub paymaster_and_data: String,
    pub signature: String,
}

/// Receipt for an included user operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserOpReceipt {
    pub user_op_hash: String,
    pub sender: String,
    pub success: bool,
    pub actual_gas_cost: String,
    pub transaction_hash: Option<String>,
    pub block_number: Option<u64>,
}

/// Status of an indexed transaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid transaction status: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A transaction as reported by the data service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionRecord {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value_wei: u128,
    pub block_number: Option<u64>,
    pub status: TransactionStatus,
}

/// Pagination parameters for history queries
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PaginationParams {
    /// Maximum number of items to return (1-100, default: 20)
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Cursor for pagination (hash to start after)
    pub cursor: Option<String>,
}

fn default_limit() -> i64 {
    20
}

impl PaginationParams {
    #[must_use]
    pub fn first_page(limit: i64) -> Self {
        Self {
            limit,
            cursor: None,
        }
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self::first_page(default_limit())
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    /// List of items
    pub items: Vec<T>,
    /// Cursor for next page (null if no more items)
    pub next_cursor: Option<String>,
    /// Whether more items exist
    pub has_more: bool,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>, has_more: bool) -> Self {
        Self {
            items,
            next_cursor,
            has_more,
        }
    }
}

/// Request for cross-chain exchange quotes
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_quote_request"))]
pub struct CrossChainQuoteRequest {
    pub from_network: Network,
    pub to_network: Network,
    /// Source token address; the zero address means the native token
    #[validate(length(min = 1, message = "From token is required"))]
    pub from_token: String,
    #[validate(length(min = 1, message = "To token is required"))]
    pub to_token: String,
    pub from_amount_wei: u128,
    #[validate(length(min = 1, message = "From address is required"))]
    pub from_address: String,
    #[validate(length(min = 1, message = "To address is required"))]
    pub to_address: String,
}

fn validate_quote_request(request: &CrossChainQuoteRequest) -> Result<(), FieldError> {
    if request.from_amount_wei == 0 {
        let mut err = FieldError::new("positive_amount");
        err.message = Some("Amount must be greater than 0".into());
        return Err(err);
    }
    if request.from_network == request.to_network {
        let mut err = FieldError::new("distinct_networks");
        err.message = Some("Source and destination networks must differ".into());
        return Err(err);
    }
    Ok(())
}

/// A route offered by the cross-chain aggregator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrossChainQuote {
    pub provider: String,
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub from_amount_wei: u128,
    pub to_amount_wei: u128,
    pub estimated_duration_secs: u64,
    /// Transaction to add to the batch to execute the route
    pub transaction: Option<UserOpTransaction>,
}

/// One row of a load-test aggregate report
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct BenchmarkRow {
    #[validate(length(min = 1, message = "Label is required"))]
    pub label: String,
    #[validate(range(min = 0, message = "Sample count cannot be negative"))]
    pub no_samples: i64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    #[validate(range(min = 0.0, max = 100.0, message = "Error percentage must be within 0-100"))]
    pub error_per: f64,
    #[validate(range(min = 0.0, message = "Throughput cannot be negative"))]
    pub throughput: f64,
    pub received_kb_per_sec: f64,
    pub sent_kb_per_sec: f64,
    pub avg_bytes: f64,
}

/// Result of loading a report into the database
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadSummary {
    pub inserted: u64,
    pub skipped: u64,
}

/// Final state of one test case
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ScenarioStatus {
    Passed,
    Skipped(String),
    Failed(String),
}

impl ScenarioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
        }
    }
}

/// Report entry for one (network, scenario) test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub network: Network,
    pub scenario: String,
    #[serde(flatten)]
    pub status: ScenarioStatus,
    /// Number of times the test body ran
    pub attempts: u32,
    /// Kind of the final error, when the case failed
    pub error_kind: Option<String>,
    /// Diagnostic context attached by the test body
    pub notes: Vec<String>,
    pub duration_ms: u64,
}

/// Report for one run of the suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<ScenarioResult>,
}

impl SuiteReport {
    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(|s| matches!(s, ScenarioStatus::Passed))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ScenarioStatus::Failed(_)))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ScenarioStatus::Skipped(_)))
    }

    /// No test case failed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, pred: impl Fn(&ScenarioStatus) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.status)).count()
    }
}
