//! Error types shared across the harness.

use thiserror::Error;

/// JSON-RPC code bundlers use for internal failures.
pub const BUNDLER_INTERNAL_ERROR: i64 = -32603;

/// JSON-RPC code bundlers use for generic server-side failures.
pub const BUNDLER_SERVER_ERROR: i64 = -32000;

/// Top-level application error
#[derive(Debug, Error)]
pub enum AppError {
    #[error("SDK error: {0}")]
    Sdk(#[from] SdkError),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl AppError {
    /// Whether the failure is worth retrying at the I/O level.
    ///
    /// Assertion failures and validation errors are never transient; they only
    /// get retried by the whole-scenario policy.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sdk(e) => e.is_transient(),
            Self::Database(e) => e.is_transient(),
            Self::Probe(ProbeError::Http(_)) => true,
            Self::Timeout(_) => true,
            _ => false,
        }
    }

    /// Short machine-readable error type, used in reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sdk(e) => e.kind(),
            Self::Assertion(_) => "assertion_failed",
            Self::Database(_) => "database_error",
            Self::Report(_) => "report_error",
            Self::Probe(_) => "probe_error",
            Self::Validation(_) => "validation_error",
            Self::Config(_) => "config_error",
            Self::Timeout(_) => "timeout",
            Self::NotSupported(_) => "not_supported",
        }
    }
}

/// Typed failures surfaced by the wallet SDK boundary
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SdkError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("insufficient balance: required {required} wei, available {available} wei")]
    InsufficientBalance { required: u128, available: u128 },

    #[error("gas estimation failed: {0}")]
    GasEstimation(String),

    #[error("bundler rejected user operation ({code}): {message}")]
    Bundler { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl SdkError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Bundler { code, .. } => {
                *code == BUNDLER_INTERNAL_ERROR || *code == BUNDLER_SERVER_ERROR
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidAddress(_) => "invalid_address",
            Self::InvalidValue(_) => "invalid_value",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::GasEstimation(_) => "gas_estimation",
            Self::Bundler { .. } => "bundler_error",
            Self::Transport(_) => "transport_error",
            Self::Timeout(_) => "sdk_timeout",
            Self::NotFound(_) => "not_found",
            Self::Unsupported(_) => "unsupported",
        }
    }
}

/// Database errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Pool timed out: {0}")]
    PoolTimeout(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

impl DatabaseError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::PoolTimeout(_))
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Self::PoolTimeout(err.to_string()),
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
                Self::Connection(err.to_string())
            }
            other => Self::Query(other.to_string()),
        }
    }
}

/// Load-test report errors
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to read report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Invalid row at line {line}: {message}")]
    InvalidRow { line: u64, message: String },
}

/// Bundler probe errors
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("RPC error ({code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("Chain id mismatch: expected {expected}, endpoint reports {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Validation failed: {0}")]
    Multiple(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdk_error_transient_classification() {
        assert!(SdkError::Transport("reset".into()).is_transient());
        assert!(SdkError::Timeout("30s".into()).is_transient());
        assert!(
            SdkError::Bundler {
                code: BUNDLER_INTERNAL_ERROR,
                message: "internal".into()
            }
            .is_transient()
        );
        assert!(
            !SdkError::Bundler {
                code: -32602,
                message: "AA21 didn't pay prefund".into()
            }
            .is_transient()
        );
        assert!(!SdkError::InvalidAddress("0x12".into()).is_transient());
        assert!(
            !SdkError::InsufficientBalance {
                required: 2,
                available: 1
            }
            .is_transient()
        );
    }

    #[test]
    fn test_app_error_transient_classification() {
        assert!(AppError::Sdk(SdkError::Transport("eof".into())).is_transient());
        assert!(AppError::Database(DatabaseError::Connection("refused".into())).is_transient());
        assert!(AppError::Timeout("receipt".into()).is_transient());
        assert!(AppError::Probe(ProbeError::Http("502".into())).is_transient());
        assert!(!AppError::Assertion("balance".into()).is_transient());
        assert!(!AppError::Database(DatabaseError::Query("syntax".into())).is_transient());
        assert!(
            !AppError::Probe(ProbeError::ChainIdMismatch {
                expected: 10,
                actual: 5
            })
            .is_transient()
        );
    }

    #[test]
    fn test_sqlx_pool_timeout_is_transient() {
        let err = DatabaseError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, DatabaseError::PoolTimeout(_)));
        assert!(err.is_transient());

        let err = DatabaseError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, DatabaseError::Query(_)));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            AppError::from(SdkError::InvalidAddress("x".into())).kind(),
            "invalid_address"
        );
        assert_eq!(AppError::Assertion("x".into()).kind(), "assertion_failed");
        assert_eq!(AppError::NotSupported("x".into()).kind(), "not_supported");
        assert_eq!(
            AppError::from(ConfigError::InvalidValue {
                name: "RECEIPT_TIMEOUT_MS".into(),
                value: "soon".into()
            })
            .kind(),
            "config_error"
        );
    }
}
