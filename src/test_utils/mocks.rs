//! Mock implementations for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::domain::{
    AppError, BenchmarkRow, BenchmarkStore, CrossChainQuote, CrossChainQuoteRequest,
    DatabaseError, EstimatedUserOp, Network, PaginatedResponse, PaginationParams, SdkError,
    TransactionRecord, TransactionStatus, UserOpBatch, UserOpReceipt, UserOpTransaction,
    WalletSdk, WalletSdkFactory,
};

/// Smart account the mock SDK reports unless told otherwise
pub const MOCK_ACCOUNT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

/// Configuration for mock behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub should_fail: bool,
    pub error_message: Option<String>,
}

impl MockConfig {
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
        }
    }

    fn message(&self) -> String {
        self.error_message
            .clone()
            .unwrap_or_else(|| "Mock error".to_string())
    }
}

struct PendingReceipt {
    receipt: UserOpReceipt,
    polls_left: u32,
}

#[derive(Default)]
struct SdkState {
    batch: Vec<UserOpTransaction>,
    nonce: u64,
    history: Vec<TransactionRecord>,
    receipts: HashMap<String, PendingReceipt>,
    failures: HashMap<&'static str, VecDeque<SdkError>>,
    calls: Vec<&'static str>,
}

/// In-memory wallet SDK with scripted failures
pub struct MockWalletSdk {
    network: Network,
    account: String,
    balance_wei: u128,
    receipt_after_polls: u32,
    receipts_succeed: bool,
    quote_providers: Vec<String>,
    config: MockConfig,
    is_healthy: AtomicBool,
    state: Mutex<SdkState>,
}

impl MockWalletSdk {
    #[must_use]
    pub fn new(network: Network) -> Self {
        Self::with_config(network, MockConfig::success())
    }

    #[must_use]
    pub fn with_config(network: Network, config: MockConfig) -> Self {
        Self {
            network,
            account: MOCK_ACCOUNT.to_string(),
            balance_wei: 10u128.pow(18),
            receipt_after_polls: 0,
            receipts_succeed: true,
            quote_providers: Vec::new(),
            config,
            is_healthy: AtomicBool::new(true),
            state: Mutex::new(SdkState::default()),
        }
    }

    /// Every call fails with a transport error
    #[must_use]
    pub fn failing(network: Network, message: impl Into<String>) -> Self {
        Self::with_config(network, MockConfig::failure(message))
    }

    #[must_use]
    pub fn with_balance(mut self, balance_wei: u128) -> Self {
        self.balance_wei = balance_wei;
        self
    }

    /// Receipts become available after `polls` empty answers
    #[must_use]
    pub fn with_receipt_after(mut self, polls: u32) -> Self {
        self.receipt_after_polls = polls;
        self
    }

    /// Submitted operations land on chain but revert
    #[must_use]
    pub fn with_reverting_ops(mut self) -> Self {
        self.receipts_succeed = false;
        self
    }

    /// Enable cross-chain quotes from the named providers
    #[must_use]
    pub fn with_quote_providers(mut self, providers: &[&str]) -> Self {
        self.quote_providers = providers.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Seed the indexed history, newest first
    #[must_use]
    pub fn with_history(self, history: Vec<TransactionRecord>) -> Self {
        self.state.lock().unwrap().history = history;
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Fail the next call to `method` with `error`
    pub fn fail_next(&self, method: &'static str, error: SdkError) {
        self.fail_times(method, 1, error);
    }

    /// Fail the next `times` calls to `method` with `error`
    pub fn fail_times(&self, method: &'static str, times: usize, error: SdkError) {
        let mut state = self.state.lock().unwrap();
        let queue = state.failures.entry(method).or_default();
        queue.extend(std::iter::repeat_n(error, times));
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == method)
            .count()
    }

    /// A history entry for `account` with a deterministic hash
    #[must_use]
    pub fn history_record(index: u64, account: &str) -> TransactionRecord {
        TransactionRecord {
            hash: format!("0x{:064x}", 0xbeef_0000 + index),
            from: account.to_string(),
            to: "0x000000000000000000000000000000000000dEaD".to_string(),
            value_wei: 1_000 + u128::from(index),
            block_number: Some(1_000_000 + index),
            status: TransactionStatus::Completed,
        }
    }

    fn enter(&self, method: &'static str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(method);
        if self.config.should_fail {
            return Err(SdkError::Transport(self.config.message()).into());
        }
        if let Some(error) = state.failures.get_mut(method).and_then(VecDeque::pop_front) {
            return Err(error.into());
        }
        Ok(())
    }
}

fn is_address(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .is_some_and(|rest| rest.len() == 40 && rest.chars().all(|c| c.is_ascii_hexdigit()))
}

#[async_trait]
impl WalletSdk for MockWalletSdk {
    fn network(&self) -> Network {
        self.network
    }

    async fn health_check(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(SdkError::Transport("Unhealthy".to_string()).into());
        }
        self.enter("health_check")
    }

    async fn get_counterfactual_address(&self) -> Result<String, AppError> {
        self.enter("get_counterfactual_address")?;
        Ok(self.account.clone())
    }

    async fn get_native_balance(&self) -> Result<u128, AppError> {
        self.enter("get_native_balance")?;
        Ok(self.balance_wei)
    }

    async fn clear_user_ops_from_batch(&self) -> Result<(), AppError> {
        self.enter("clear_user_ops_from_batch")?;
        self.state.lock().unwrap().batch.clear();
        Ok(())
    }

    async fn add_user_ops_to_batch(
        &self,
        transaction: UserOpTransaction,
    ) -> Result<UserOpBatch, AppError> {
        self.enter("add_user_ops_to_batch")?;
        if !is_address(&transaction.to) {
            return Err(SdkError::InvalidAddress(transaction.to).into());
        }
        let mut state = self.state.lock().unwrap();
        state.batch.push(transaction);
        Ok(UserOpBatch {
            transactions: state.batch.clone(),
        })
    }

    async fn estimate(&self) -> Result<EstimatedUserOp, AppError> {
        self.enter("estimate")?;
        let state = self.state.lock().unwrap();
        if state.batch.is_empty() {
            return Err(SdkError::InvalidValue("batch is empty".to_string()).into());
        }
        let required = UserOpBatch {
            transactions: state.batch.clone(),
        }
        .total_value_wei();
        if required > self.balance_wei {
            return Err(SdkError::InsufficientBalance {
                required,
                available: self.balance_wei,
            }
            .into());
        }

        Ok(EstimatedUserOp {
            sender: self.account.clone(),
            nonce: format!("0x{:x}", state.nonce),
            call_data: format!("0x{}", "00".repeat(4 + 32 * state.batch.len())),
            call_gas_limit: "0x5208".to_string(),
            verification_gas_limit: "0x186a0".to_string(),
            pre_verification_gas: "0xb5c8".to_string(),
            max_fee_per_gas: "0x59682f00".to_string(),
            max_priority_fee_per_gas: "0x59682f00".to_string(),
            paymaster_and_data: "0x".to_string(),
            signature: format!("0x{}", "ab".repeat(65)),
        })
    }

    async fn send(&self, user_op: &EstimatedUserOp) -> Result<String, AppError> {
        self.enter("send")?;
        let mut state = self.state.lock().unwrap();
        state.nonce += 1;
        let hash = format!("0x{:064x}", state.nonce);
        let tx_hash = format!("0x{:064x}", 0xf000_0000u64 + state.nonce);

        let transfers = std::mem::take(&mut state.batch);
        for tx in transfers.iter().rev() {
            state.history.insert(
                0,
                TransactionRecord {
                    hash: tx_hash.clone(),
                    from: user_op.sender.clone(),
                    to: tx.to.clone(),
                    value_wei: tx.value_wei,
                    block_number: None,
                    status: TransactionStatus::Pending,
                },
            );
        }

        let block_number = 1_000_000 + state.nonce;
        state.receipts.insert(
            hash.clone(),
            PendingReceipt {
                receipt: UserOpReceipt {
                    user_op_hash: hash.clone(),
                    sender: user_op.sender.clone(),
                    success: self.receipts_succeed,
                    actual_gas_cost: "0x2386f26fc10000".to_string(),
                    transaction_hash: Some(tx_hash),
                    block_number: Some(block_number),
                },
                polls_left: self.receipt_after_polls,
            },
        );
        Ok(hash)
    }

    async fn get_user_op_receipt(
        &self,
        user_op_hash: &str,
    ) -> Result<Option<UserOpReceipt>, AppError> {
        self.enter("get_user_op_receipt")?;
        let mut state = self.state.lock().unwrap();
        let Some(pending) = state.receipts.get_mut(user_op_hash) else {
            return Ok(None);
        };
        if pending.polls_left > 0 {
            pending.polls_left -= 1;
            return Ok(None);
        }
        Ok(Some(pending.receipt.clone()))
    }

    async fn get_transactions(
        &self,
        account: &str,
        page: &PaginationParams,
    ) -> Result<PaginatedResponse<TransactionRecord>, AppError> {
        self.enter("get_transactions")?;
        let state = self.state.lock().unwrap();
        let involved: Vec<&TransactionRecord> = state
            .history
            .iter()
            .filter(|tx| tx.from.eq_ignore_ascii_case(account) || tx.to.eq_ignore_ascii_case(account))
            .collect();

        let start = match &page.cursor {
            Some(cursor) => involved
                .iter()
                .position(|tx| tx.hash == *cursor)
                .map_or(involved.len(), |p| p + 1),
            None => 0,
        };
        let limit = page.limit.clamp(1, 100) as usize;
        let items: Vec<TransactionRecord> = involved
            .iter()
            .skip(start)
            .take(limit)
            .map(|tx| (*tx).clone())
            .collect();
        let has_more = start + items.len() < involved.len();
        let next_cursor = if has_more {
            items.last().map(|tx| tx.hash.clone())
        } else {
            None
        };
        Ok(PaginatedResponse::new(items, next_cursor, has_more))
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<TransactionRecord>, AppError> {
        self.enter("get_transaction")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .history
            .iter()
            .find(|tx| tx.hash.eq_ignore_ascii_case(hash))
            .cloned())
    }

    async fn get_cross_chain_quotes(
        &self,
        request: &CrossChainQuoteRequest,
    ) -> Result<Vec<CrossChainQuote>, AppError> {
        self.enter("get_cross_chain_quotes")?;
        if self.quote_providers.is_empty() {
            return Err(AppError::NotSupported(format!(
                "no exchange providers on {}",
                self.network
            )));
        }
        Ok(self
            .quote_providers
            .iter()
            .enumerate()
            .map(|(i, provider)| CrossChainQuote {
                provider: provider.clone(),
                from_chain_id: request.from_network.chain_id(),
                to_chain_id: request.to_network.chain_id(),
                from_amount_wei: request.from_amount_wei,
                to_amount_wei: request.from_amount_wei / 100 * 99u128.saturating_sub(i as u128).max(1),
                estimated_duration_secs: 60 * (i as u64 + 1),
                transaction: Some(UserOpTransaction {
                    to: request.from_address.clone(),
                    value_wei: request.from_amount_wei,
                    data: Some("0x".to_string()),
                }),
            })
            .collect())
    }
}

/// Hands out one shared [`MockWalletSdk`] per network
#[derive(Default)]
pub struct MockWalletSdkFactory {
    sdks: HashMap<Network, Arc<MockWalletSdk>>,
    connects: AtomicU32,
    failing_connects: AtomicU32,
    connect_limit: Option<u32>,
}

impl MockWalletSdkFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_sdk(mut self, sdk: Arc<MockWalletSdk>) -> Self {
        self.sdks.insert(sdk.network(), sdk);
        self
    }

    /// Refuse every connect after the first `successes` ones
    #[must_use]
    pub fn with_connect_limit(mut self, successes: u32) -> Self {
        self.connect_limit = Some(successes);
        self
    }

    /// Fail the next `times` connects with a transport error
    pub fn fail_next_connects(&self, times: u32) {
        self.failing_connects.store(times, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletSdkFactory for MockWalletSdkFactory {
    async fn connect(&self, network: Network) -> Result<Arc<dyn WalletSdk>, AppError> {
        let previous = self.connects.fetch_add(1, Ordering::SeqCst);
        if self.connect_limit.is_some_and(|limit| previous >= limit) {
            return Err(SdkError::Transport("connection refused".to_string()).into());
        }
        let failing = self
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SdkError::Transport("connection refused".to_string()).into());
        }
        match self.sdks.get(&network) {
            Some(sdk) => Ok(Arc::clone(sdk) as Arc<dyn WalletSdk>),
            None => Err(SdkError::Unsupported(format!("no SDK configured for {}", network)).into()),
        }
    }
}

/// Mock benchmark store for testing
pub struct MockBenchmarkStore {
    rows: Mutex<Vec<BenchmarkRow>>,
    config: MockConfig,
    transient_failures: AtomicU32,
    insert_calls: AtomicU32,
}

impl MockBenchmarkStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            config,
            transient_failures: AtomicU32::new(0),
            insert_calls: AtomicU32::new(0),
        }
    }

    /// Every insert fails with a non-transient query error
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    /// Fail the next `times` inserts with a dropped connection
    pub fn fail_next_inserts(&self, times: u32) {
        self.transient_failures.store(times, Ordering::SeqCst);
    }

    pub fn insert_calls(&self) -> u32 {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Get all stored rows (for testing)
    pub fn get_all_rows(&self) -> Vec<BenchmarkRow> {
        self.rows.lock().unwrap().clone()
    }
}

impl Default for MockBenchmarkStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BenchmarkStore for MockBenchmarkStore {
    async fn health_check(&self) -> Result<(), AppError> {
        if self.config.should_fail {
            return Err(DatabaseError::Connection(self.config.message()).into());
        }
        Ok(())
    }

    async fn insert_benchmark_row(&self, row: &BenchmarkRow) -> Result<i64, AppError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.config.should_fail {
            return Err(DatabaseError::Query(self.config.message()).into());
        }
        let dropped = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if dropped {
            return Err(DatabaseError::Connection("connection reset by peer".to_string()).into());
        }
        let mut rows = self.rows.lock().unwrap();
        rows.push(row.clone());
        Ok(rows.len() as i64)
    }

    async fn count_benchmark_rows(&self) -> Result<i64, AppError> {
        if self.config.should_fail {
            return Err(DatabaseError::Query(self.config.message()).into());
        }
        Ok(self.rows.lock().unwrap().len() as i64)
    }
}
