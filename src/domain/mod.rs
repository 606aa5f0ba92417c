//! Domain layer containing core types, traits, and error definitions.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{
    AppError, ConfigError, DatabaseError, ProbeError, ReportError, SdkError, ValidationError,
};
pub use traits::{BenchmarkStore, WalletSdk, WalletSdkFactory};
pub use types::{
    BenchmarkRow, CrossChainQuote, CrossChainQuoteRequest, EstimatedUserOp, LoadSummary, Network,
    PaginatedResponse, PaginationParams, ScenarioResult, ScenarioStatus, SuiteReport,
    TransactionRecord, TransactionStatus, UserOpBatch, UserOpReceipt, UserOpTransaction,
};
