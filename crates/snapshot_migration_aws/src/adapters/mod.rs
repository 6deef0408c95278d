pub mod errors;
pub mod kms;
pub mod rds;

/// Runs an SDK future to completion from synchronous trait code. Works both
/// on a runtime worker thread and on the blocking pool.
fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
