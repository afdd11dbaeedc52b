//! AWS-facing adapters, pipeline stage handlers and operator workflows.
//!
//! Deployment decisions live in `ci_deploy_core`; this crate wires them to
//! CloudFormation, CodePipeline, S3 and STS, and hosts the `pipeline_stage`
//! Lambda and the `ci` operator CLI.

pub mod adapters;
pub mod handlers;
pub mod workflows;
