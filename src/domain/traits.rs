//! Domain traits defining contracts for external systems.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::AppError;
use super::types::{
    BenchmarkRow, CrossChainQuote, CrossChainQuoteRequest, EstimatedUserOp, Network,
    PaginatedResponse, PaginationParams, TransactionRecord, UserOpBatch, UserOpReceipt,
    UserOpTransaction,
};

/// Wallet SDK client bound to one network.
///
/// The SDK keeps a pending batch of calls; `add_user_ops_to_batch` appends,
/// `estimate` turns the batch into a signed user operation and `send` hands
/// it to the bundler.
#[async_trait]
pub trait WalletSdk: Send + Sync {
    /// Network this client talks to
    fn network(&self) -> Network;

    /// Check that the SDK's remote endpoints are reachable
    async fn health_check(&self) -> Result<(), AppError>;

    /// Smart account address derived for the configured owner
    async fn get_counterfactual_address(&self) -> Result<String, AppError>;

    /// Native balance of the smart account, in wei
    async fn get_native_balance(&self) -> Result<u128, AppError>;

    /// Drop every call from the pending batch
    async fn clear_user_ops_from_batch(&self) -> Result<(), AppError>;

    /// Append a call to the pending batch and return the updated batch
    async fn add_user_ops_to_batch(
        &self,
        transaction: UserOpTransaction,
    ) -> Result<UserOpBatch, AppError>;

    /// Estimate fees for the pending batch and sign it
    async fn estimate(&self) -> Result<EstimatedUserOp, AppError>;

    /// Submit a signed user operation to the bundler, returning its hash
    async fn send(&self, user_op: &EstimatedUserOp) -> Result<String, AppError>;

    /// Receipt of a submitted user operation, `None` while not yet included
    async fn get_user_op_receipt(
        &self,
        user_op_hash: &str,
    ) -> Result<Option<UserOpReceipt>, AppError>;

    /// Historical transactions of an account
    async fn get_transactions(
        &self,
        account: &str,
        page: &PaginationParams,
    ) -> Result<PaginatedResponse<TransactionRecord>, AppError> {
        let _ = (account, page);
        Err(AppError::NotSupported(
            "get_transactions not implemented".to_string(),
        ))
    }

    /// A single historical transaction by hash
    async fn get_transaction(&self, hash: &str) -> Result<Option<TransactionRecord>, AppError> {
        let _ = hash;
        Err(AppError::NotSupported(
            "get_transaction not implemented".to_string(),
        ))
    }

    /// Cross-chain exchange quotes
    async fn get_cross_chain_quotes(
        &self,
        request: &CrossChainQuoteRequest,
    ) -> Result<Vec<CrossChainQuote>, AppError> {
        let _ = request;
        Err(AppError::NotSupported(
            "get_cross_chain_quotes not implemented".to_string(),
        ))
    }
}

/// Builds fresh SDK clients, one per test case attempt
#[async_trait]
pub trait WalletSdkFactory: Send + Sync {
    async fn connect(&self, network: Network) -> Result<Arc<dyn WalletSdk>, AppError>;
}

/// Storage for load-test report rows
#[async_trait]
pub trait BenchmarkStore: Send + Sync {
    /// Check database connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    /// Insert one report row, returning its id
    async fn insert_benchmark_row(&self, row: &BenchmarkRow) -> Result<i64, AppError>;

    /// Number of stored rows
    async fn count_benchmark_rows(&self) -> Result<i64, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MinimalWalletSdk;

    #[async_trait]
    impl WalletSdk for MinimalWalletSdk {
        fn network(&self) -> Network {
            Network::Goerli
        }

        async fn health_check(&self) -> Result<(), AppError> {
            Ok(())
        }

        async fn get_counterfactual_address(&self) -> Result<String, AppError> {
            Ok("0x0000000000000000000000000000000000000001".to_string())
        }

        async fn get_native_balance(&self) -> Result<u128, AppError> {
            Ok(0)
        }

        async fn clear_user_ops_from_batch(&self) -> Result<(), AppError> {
            Ok(())
        }

        async fn add_user_ops_to_batch(
            &self,
            transaction: UserOpTransaction,
        ) -> Result<UserOpBatch, AppError> {
            Ok(UserOpBatch {
                transactions: vec![transaction],
            })
        }

        async fn estimate(&self) -> Result<EstimatedUserOp, AppError> {
            Ok(EstimatedUserOp::default())
        }

        async fn send(&self, _user_op: &EstimatedUserOp) -> Result<String, AppError> {
            Ok("0xhash".to_string())
        }

        async fn get_user_op_receipt(
            &self,
            _user_op_hash: &str,
        ) -> Result<Option<UserOpReceipt>, AppError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_wallet_sdk_history_not_supported_by_default() {
        let sdk = MinimalWalletSdk;
        let result = sdk.get_transactions("0x1", &PaginationParams::default()).await;
        assert!(matches!(result, Err(AppError::NotSupported(_))));

        let result = sdk.get_transaction("0xabc").await;
        assert!(matches!(result, Err(AppError::NotSupported(_))));
    }

    #[tokio::test]
    async fn test_wallet_sdk_quotes_not_supported_by_default() {
        let sdk = MinimalWalletSdk;
        let request = CrossChainQuoteRequest {
            from_network: Network::Goerli,
            to_network: Network::Mumbai,
            from_token: "0x0".to_string(),
            to_token: "0x0".to_string(),
            from_amount_wei: 1,
            from_address: "0x1".to_string(),
            to_address: "0x1".to_string(),
        };
        let result = sdk.get_cross_chain_quotes(&request).await;
        assert!(matches!(result, Err(AppError::NotSupported(_))));
    }
}
