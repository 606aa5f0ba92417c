//! End-to-end scenarios run against a wallet SDK.
//!
//! Each scenario is one unit of work: a sequence of SDK calls plus checks on
//! what comes back. Individual calls go through the context's I/O policy;
//! the runner retries the scenario as a whole.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use validator::Validate;

use crate::domain::{
    AppError, CrossChainQuoteRequest, PaginationParams, SdkError, UserOpTransaction,
    ValidationError,
};

use super::context::ScenarioContext;
use super::wait::poll_until;

/// Recipient one hex digit short of a valid address
pub const INVALID_RECIPIENT: &str = "0x7F30B1960D5556929B03a0339814fE903c55a34";

macro_rules! ensure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err(AppError::Assertion(format!($($arg)+)));
        }
    };
}

/// What a scenario body reports on success
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioOutcome {
    Passed,
    /// Preconditions not met; nothing was asserted
    Skipped(String),
}

/// The test cases the suite knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Batch, estimate and send a native transfer, then wait for its receipt
    NativeTransfer,
    /// First page of the account's transaction history
    TransactionHistory,
    /// Look a single transaction up by hash
    SingleTransaction,
    /// Cross-chain exchange quotes towards a sibling network
    CrossChainQuote,
    /// A malformed recipient address must be refused
    RejectsInvalidRecipient,
    /// A transfer above the balance must be refused
    RejectsExcessiveValue,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Self::NativeTransfer,
        Self::TransactionHistory,
        Self::SingleTransaction,
        Self::CrossChainQuote,
        Self::RejectsInvalidRecipient,
        Self::RejectsExcessiveValue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NativeTransfer => "native_transfer",
            Self::TransactionHistory => "transaction_history",
            Self::SingleTransaction => "single_transaction",
            Self::CrossChainQuote => "cross_chain_quote",
            Self::RejectsInvalidRecipient => "rejects_invalid_recipient",
            Self::RejectsExcessiveValue => "rejects_excessive_value",
        }
    }

    /// Run the scenario body once
    #[instrument(skip(self, ctx), fields(scenario = %self, network = %ctx.network))]
    pub async fn execute(&self, ctx: &ScenarioContext) -> Result<ScenarioOutcome, AppError> {
        match self {
            Self::NativeTransfer => native_transfer(ctx).await,
            Self::TransactionHistory => transaction_history(ctx).await,
            Self::SingleTransaction => single_transaction(ctx).await,
            Self::CrossChainQuote => cross_chain_quote(ctx).await,
            Self::RejectsInvalidRecipient => rejects_invalid_recipient(ctx).await,
            Self::RejectsExcessiveValue => rejects_excessive_value(ctx).await,
        }
    }
}

impl std::str::FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.as_str() == s)
            .ok_or_else(|| format!("Invalid scenario: {}", s))
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `0x` followed by 40 hex digits
#[must_use]
pub fn is_hex_address(value: &str) -> bool {
    is_prefixed_hex(value, 40)
}

/// `0x` followed by 64 hex digits
#[must_use]
pub fn is_hex_hash(value: &str) -> bool {
    is_prefixed_hex(value, 64)
}

fn is_prefixed_hex(value: &str, digits: usize) -> bool {
    value
        .strip_prefix("0x")
        .is_some_and(|rest| rest.len() == digits && rest.chars().all(|c| c.is_ascii_hexdigit()))
}

fn validated<T: Validate>(value: T) -> Result<T, AppError> {
    value
        .validate()
        .map_err(|e| AppError::Validation(ValidationError::Multiple(e.to_string())))?;
    Ok(value)
}

async fn smart_account(ctx: &ScenarioContext) -> Result<String, AppError> {
    let account = ctx.call(|| ctx.sdk.get_counterfactual_address()).await?;
    ensure!(
        is_hex_address(&account),
        "counterfactual address '{}' is not a valid address",
        account
    );
    Ok(account)
}

async fn native_transfer(ctx: &ScenarioContext) -> Result<ScenarioOutcome, AppError> {
    let sdk = &ctx.sdk;
    let settings = &ctx.settings;

    let account = smart_account(ctx).await?;
    ctx.note(format!("smart account: {}", account));

    let balance = ctx.call(|| sdk.get_native_balance()).await?;
    if balance < settings.transfer_value_wei {
        return Ok(ScenarioOutcome::Skipped(format!(
            "balance {} wei is below the transfer value of {} wei",
            balance, settings.transfer_value_wei
        )));
    }

    let transfer =
        UserOpTransaction::native_transfer(settings.recipient.clone(), settings.transfer_value_wei);

    // Clear and add as one unit so a retried call never leaves a doubled batch
    let batch = ctx
        .call(|| {
            let transfer = transfer.clone();
            async move {
                sdk.clear_user_ops_from_batch().await?;
                sdk.add_user_ops_to_batch(transfer).await
            }
        })
        .await?;
    ensure!(
        batch.len() == 1,
        "expected 1 call in the batch, found {}",
        batch.len()
    );
    ensure!(
        batch.transactions[0] == transfer,
        "batched call does not match the requested transfer"
    );

    let user_op = ctx.call(|| sdk.estimate()).await?;
    ensure!(
        user_op.sender.eq_ignore_ascii_case(&account),
        "estimated sender {} differs from smart account {}",
        user_op.sender,
        account
    );
    ensure!(
        !user_op.signature.is_empty() && user_op.signature != "0x",
        "estimated user operation is not signed"
    );
    for (field, value) in [
        ("callGasLimit", &user_op.call_gas_limit),
        ("verificationGasLimit", &user_op.verification_gas_limit),
        ("preVerificationGas", &user_op.pre_verification_gas),
        ("maxFeePerGas", &user_op.max_fee_per_gas),
    ] {
        ensure!(!value.is_empty(), "estimate returned an empty {}", field);
    }

    // Sending is not idempotent, so it is left to the scenario-level retry
    let user_op_hash = sdk.send(&user_op).await?;
    ensure!(
        is_hex_hash(&user_op_hash),
        "bundler returned a malformed user operation hash '{}'",
        user_op_hash
    );
    ctx.note(format!("user operation hash: {}", user_op_hash));
    info!(user_op_hash = %user_op_hash, "User operation submitted");

    let hash = user_op_hash.as_str();
    let receipt = poll_until(
        settings.receipt_poll_interval,
        settings.receipt_timeout,
        || ctx.call(move || sdk.get_user_op_receipt(hash)),
    )
    .await?
    .ok_or_else(|| {
        AppError::Assertion(format!(
            "no receipt for {} within {:?}",
            user_op_hash, settings.receipt_timeout
        ))
    })?;

    ensure!(
        receipt.user_op_hash == user_op_hash,
        "receipt belongs to {} instead of {}",
        receipt.user_op_hash,
        user_op_hash
    );
    ensure!(receipt.success, "user operation {} reverted", user_op_hash);
    if let Some(tx_hash) = &receipt.transaction_hash {
        ctx.note(format!("transaction hash: {}", tx_hash));
    }
    Ok(ScenarioOutcome::Passed)
}

async fn transaction_history(ctx: &ScenarioContext) -> Result<ScenarioOutcome, AppError> {
    let account = smart_account(ctx).await?;
    let page = validated(PaginationParams::first_page(ctx.settings.history_page_size))?;

    let history = ctx
        .call(|| ctx.sdk.get_transactions(&account, &page))
        .await?;
    ensure!(
        history.items.len() as i64 <= page.limit,
        "page holds {} transactions, limit was {}",
        history.items.len(),
        page.limit
    );
    ensure!(
        !history.has_more || history.next_cursor.is_some(),
        "history reports more pages but no cursor"
    );

    if history.items.is_empty() {
        return Ok(ScenarioOutcome::Skipped(format!(
            "no transactions recorded for {}",
            account
        )));
    }

    for tx in &history.items {
        ensure!(is_hex_hash(&tx.hash), "malformed transaction hash '{}'", tx.hash);
        ensure!(
            is_hex_address(&tx.from),
            "transaction {} has malformed sender '{}'",
            tx.hash,
            tx.from
        );
        ensure!(
            tx.from.eq_ignore_ascii_case(&account) || tx.to.eq_ignore_ascii_case(&account),
            "transaction {} does not involve {}",
            tx.hash,
            account
        );
    }

    ctx.note(format!(
        "{} transaction(s) on the first page",
        history.items.len()
    ));
    Ok(ScenarioOutcome::Passed)
}

async fn single_transaction(ctx: &ScenarioContext) -> Result<ScenarioOutcome, AppError> {
    let account = smart_account(ctx).await?;
    let page = PaginationParams::first_page(1);

    let history = ctx
        .call(|| ctx.sdk.get_transactions(&account, &page))
        .await?;
    let Some(expected) = history.items.into_iter().next() else {
        return Ok(ScenarioOutcome::Skipped(format!(
            "no transactions recorded for {}",
            account
        )));
    };

    let fetched = ctx
        .call(|| ctx.sdk.get_transaction(&expected.hash))
        .await?
        .ok_or_else(|| {
            AppError::Assertion(format!("transaction {} could not be found", expected.hash))
        })?;

    ensure!(
        fetched.hash.eq_ignore_ascii_case(&expected.hash),
        "looked up {} but got {}",
        expected.hash,
        fetched.hash
    );
    ensure!(
        fetched.from.eq_ignore_ascii_case(&expected.from),
        "sender of {} changed between history and lookup",
        expected.hash
    );
    ctx.note(format!("transaction {} is {}", fetched.hash, fetched.status));
    Ok(ScenarioOutcome::Passed)
}

async fn cross_chain_quote(ctx: &ScenarioContext) -> Result<ScenarioOutcome, AppError> {
    let account = smart_account(ctx).await?;
    let to_network = ctx.settings.quote_destination(ctx.network);
    let request = validated(CrossChainQuoteRequest {
        from_network: ctx.network,
        to_network,
        from_token: ctx.settings.quote_token.clone(),
        to_token: ctx.settings.quote_token.clone(),
        from_amount_wei: ctx.settings.quote_amount_wei,
        from_address: account.clone(),
        to_address: account,
    })?;

    let quotes = match ctx.call(|| ctx.sdk.get_cross_chain_quotes(&request)).await {
        Ok(quotes) => quotes,
        Err(AppError::NotSupported(reason)) => {
            return Ok(ScenarioOutcome::Skipped(format!(
                "cross-chain quotes unavailable on {}: {}",
                ctx.network, reason
            )));
        }
        Err(e) => return Err(e),
    };

    ensure!(
        !quotes.is_empty(),
        "no cross-chain quotes from {} to {}",
        ctx.network,
        to_network
    );
    for quote in &quotes {
        ensure!(
            quote.from_chain_id == ctx.network.chain_id(),
            "{} quote starts on chain {} instead of {}",
            quote.provider,
            quote.from_chain_id,
            ctx.network.chain_id()
        );
        ensure!(
            quote.to_chain_id == to_network.chain_id(),
            "{} quote ends on chain {} instead of {}",
            quote.provider,
            quote.to_chain_id,
            to_network.chain_id()
        );
        ensure!(
            quote.from_amount_wei == request.from_amount_wei,
            "{} quote is for {} wei, requested {} wei",
            quote.provider,
            quote.from_amount_wei,
            request.from_amount_wei
        );
        ensure!(
            quote.to_amount_wei > 0,
            "{} quote yields nothing",
            quote.provider
        );
    }

    if let Some(best) = quotes.iter().max_by_key(|q| q.to_amount_wei) {
        ctx.note(format!(
            "{} quote(s) to {}, best {} wei via {}",
            quotes.len(),
            to_network,
            best.to_amount_wei,
            best.provider
        ));
    }
    Ok(ScenarioOutcome::Passed)
}

async fn rejects_invalid_recipient(ctx: &ScenarioContext) -> Result<ScenarioOutcome, AppError> {
    let sdk = &ctx.sdk;
    let transfer =
        UserOpTransaction::native_transfer(INVALID_RECIPIENT, ctx.settings.transfer_value_wei);

    let result = ctx
        .call(|| {
            let transfer = transfer.clone();
            async move {
                sdk.clear_user_ops_from_batch().await?;
                sdk.add_user_ops_to_batch(transfer).await?;
                sdk.estimate().await
            }
        })
        .await;

    match result {
        Err(AppError::Sdk(SdkError::InvalidAddress(detail))) => {
            debug!(detail = %detail, "Invalid recipient refused");
            ctx.note(format!("refused as expected: {}", detail));
            Ok(ScenarioOutcome::Passed)
        }
        Err(e) if e.is_transient() => Err(e),
        Err(e) => Err(AppError::Assertion(format!(
            "expected an invalid address error, got {} ({})",
            e.kind(),
            e
        ))),
        Ok(_) => Err(AppError::Assertion(format!(
            "transfer to invalid recipient {} was accepted",
            INVALID_RECIPIENT
        ))),
    }
}

async fn rejects_excessive_value(ctx: &ScenarioContext) -> Result<ScenarioOutcome, AppError> {
    let sdk = &ctx.sdk;
    let balance = ctx.call(|| sdk.get_native_balance()).await?;
    let Some(value) = balance.checked_add(ctx.settings.transfer_value_wei.max(1)) else {
        return Ok(ScenarioOutcome::Skipped(
            "balance too large to exceed".to_string(),
        ));
    };
    let transfer = UserOpTransaction::native_transfer(ctx.settings.recipient.clone(), value);

    let result = ctx
        .call(|| {
            let transfer = transfer.clone();
            async move {
                sdk.clear_user_ops_from_batch().await?;
                sdk.add_user_ops_to_batch(transfer).await?;
                sdk.estimate().await
            }
        })
        .await;

    match result {
        Err(AppError::Sdk(SdkError::InsufficientBalance {
            required,
            available,
        })) => {
            ensure!(
                required > available,
                "insufficient balance reported with required {} <= available {}",
                required,
                available
            );
            ctx.note(format!(
                "refused as expected: required {} wei, available {} wei",
                required, available
            ));
            Ok(ScenarioOutcome::Passed)
        }
        Err(e) if e.is_transient() => Err(e),
        Err(e) => Err(AppError::Assertion(format!(
            "expected an insufficient balance error, got {} ({})",
            e.kind(),
            e
        ))),
        Ok(_) => Err(AppError::Assertion(format!(
            "transfer of {} wei with a balance of {} wei was accepted",
            value, balance
        ))),
    }
}
