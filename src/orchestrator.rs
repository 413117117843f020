use crossbeam_channel::{bounded, unbounded, Sender};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use tracing::{error, info, warn};

use crate::chain::{validate_chain, CertificateChain};
use crate::error::{BatchError, FailureKind};
use crate::result::{collect, ChainValidationResult};
use crate::rootstores::TrustPools;
use crate::validate::MAX_EXPLORED_ARRANGEMENTS;

#[derive(Clone, Debug)]
pub struct ValidationOptions {
    /// Worker threads; each chain is one task on this pool.
    pub workers: usize,
    pub max_explorations: usize,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            max_explorations: MAX_EXPLORED_ARRANGEMENTS,
        }
    }
}

/// Validate every chain of a batch and return one result per chain, in input
/// order. Fails up front, before any chain is touched, when no store loaded.
pub fn validate_batch(
    chains: Vec<CertificateChain>,
    pools: &TrustPools,
    options: &ValidationOptions,
) -> Result<Vec<ChainValidationResult>, BatchError> {
    if pools.is_empty() {
        return Err(BatchError::NoTrustStores);
    }
    let expected = chains.len();
    let workers = options.workers.clamp(1, expected.max(1));
    info!(chains = expected, workers, stores = pools.available().count(), "starting validation");

    let (job_tx, job_rx) = unbounded::<(usize, CertificateChain)>();
    for job in chains.into_iter().enumerate() {
        // The receiver is alive until the scope below ends.
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let (result_tx, result_rx) = bounded::<(usize, ChainValidationResult)>(expected);
    thread::scope(|scope| {
        for _ in 0..workers {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            scope.spawn(move || {
                for (pos, chain) in jobs.iter() {
                    run_task(pos, chain.id, pools, &results, || {
                        validate_chain(&chain, pools, options.max_explorations)
                    });
                }
            });
        }
        drop(result_tx);
        collect(&result_rx, expected)
    })
}

/// Run one chain's validation and send exactly one result for position
/// `pos`, whatever happens inside `work`.
pub(crate) fn run_task<F>(
    pos: usize,
    id: i32,
    pools: &TrustPools,
    results: &Sender<(usize, ChainValidationResult)>,
    work: F,
) where
    F: FnOnce() -> ChainValidationResult,
{
    let result = catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|panic| {
        let message = format!("validation aborted: {}", panic_message(panic.as_ref()));
        error!(id, %message, "validation task faulted");
        ChainValidationResult::failed(id, pools, &message, FailureKind::Other)
    });
    if results.send((pos, result)).is_err() {
        warn!(id, "result collector is gone; dropping result");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
