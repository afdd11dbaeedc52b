pub mod artifact_store;
pub mod cloudformation;
pub mod codepipeline;
pub mod http_probe;
pub mod identity;
pub mod job_reporter;
pub mod s3;

use std::future::Future;

/// Drives an SDK future to completion from synchronous seam code running on
/// the multi-threaded runtime.
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
