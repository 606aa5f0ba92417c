//! Test doubles for the SDK and storage boundaries.

pub mod mocks;

pub use mocks::{
    MOCK_ACCOUNT, MockBenchmarkStore, MockConfig, MockWalletSdk, MockWalletSdkFactory,
};
