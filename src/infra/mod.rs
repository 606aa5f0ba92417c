//! Infrastructure layer implementations.

pub mod database;
pub mod probe;
pub mod report;

pub use database::{PostgresClient, PostgresConfig};
pub use probe::{BundlerEndpoints, BundlerProbe, ProbeReport};
pub use report::read_benchmark_rows;
