//! Connectivity checks for the services the suite depends on.

pub mod bundler;

pub use bundler::{BundlerEndpoints, BundlerProbe, ProbeReport, parse_hex_u64};
