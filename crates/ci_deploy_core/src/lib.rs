//! Shared deployment domain primitives.
//!
//! This crate owns stack lifecycle decisions, polling, parameter assembly,
//! artifact packaging and the pipeline job contracts. It intentionally
//! excludes AWS SDK and Lambda runtime concerns; those live in
//! `ci_deploy_aws` behind the seams declared here.

pub mod bucket;
pub mod config;
pub mod error;
pub mod job;
pub mod log;
pub mod packaging;
pub mod params;
pub mod poll;
pub mod probe;
pub mod stack;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
