//! Phase sequencer: builds map tasks from input files, dispatches them to
//! idle workers, barriers on the map phase, then dispatches one reduce
//! task per reducer index and tears the job down.
//!
//! See `original_source/master*.go`'s thin
//! `StartMaster`/`StartMasterWithAddr` wrappers, which describe worker
//! selection and phase barriers only at the call-site level — `run_job`
//! is this rewrite's concrete realization of that sequencing.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context as _;
use tarpc::{client, context, tokio_serde::formats::Json};
use tokio::sync::Mutex as AsyncMutex;

use crate::mr::error::MrError;
use crate::mr::rpc;

use super::registry::{Registry, WorkerHandle};

const DISPATCH_DEADLINE: std::time::Duration = std::time::Duration::from_secs(60);

async fn connect_worker(address: &str) -> anyhow::Result<rpc::WorkerClient> {
    let addr: std::net::SocketAddr = address
        .parse()
        .with_context(|| format!("invalid worker address `{address}`"))?;
    let transport = tarpc::serde_transport::tcp::connect(addr, Json::default).await?;
    Ok(rpc::WorkerClient::new(client::Config::default(), transport).spawn())
}

/// Drives one job to completion: map phase, then reduce phase, then
/// `end` to every registered worker. Returns once every registered
/// worker has been sent `end` — it does not wait for the workers'
/// processes to unwind, that's `mr::supervisor`'s job.
pub async fn run_job(registry: &Arc<Registry>, inputs: &[PathBuf], n_reduce: usize, n_worker: usize) -> anyhow::Result<()> {
    registry.wait_for_registrations(n_worker).await;
    tracing::info!(workers = n_worker, "all workers registered, starting map phase");

    dispatch_map_phase(registry, inputs).await?;
    tracing::info!("map phase complete, starting reduce phase");

    dispatch_reduce_phase(registry, n_reduce).await?;
    tracing::info!("reduce phase complete, tearing down workers");

    teardown(registry).await;
    Ok(())
}

/// One map task per input file (whole-file shard; the master never
/// constructs a mid-file range). Workers are
/// first-fit over idle handles in registration order: one polling task
/// per registered worker pulls the next file off a shared FIFO queue and
/// dispatches it, so a worker is never sent a second `map` RPC while its
/// first is still in flight — a worker may still run several map tasks
/// in sequence if there are more files than workers.
async fn dispatch_map_phase(registry: &Arc<Registry>, inputs: &[PathBuf]) -> anyhow::Result<()> {
    let workers = registry.snapshot_workers();
    anyhow::ensure!(!workers.is_empty(), "no workers registered for map phase");

    let mut queue = VecDeque::with_capacity(inputs.len());
    for path in inputs {
        let len = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("statting input file {}", path.display()))?
            .len();
        queue.push_back((path.to_string_lossy().into_owned(), len));
    }
    let queue = Arc::new(AsyncMutex::new(queue));

    let mut tasks = tokio::task::JoinSet::new();
    for worker in workers {
        let queue = queue.clone();
        tasks.spawn(run_map_tasks_for_worker(worker, queue));
    }

    while let Some(res) = tasks.join_next().await {
        res.context("map dispatch task panicked")?
            .map_err(|source| MrError::Rpc { call: "map", source })?;
    }
    Ok(())
}

/// Pulls files off `queue` one at a time and dispatches each as a `map`
/// RPC to `worker`, until the queue is empty. Never has more than one
/// `map` RPC in flight to this worker at once.
async fn run_map_tasks_for_worker(worker: WorkerHandle, queue: Arc<AsyncMutex<VecDeque<(String, u64)>>>) -> anyhow::Result<()> {
    loop {
        let next = queue.lock().await.pop_front();
        let Some((file, len)) = next else { return Ok(()) };

        let client = connect_worker(&worker.address).await?;
        let mut ctx = context::current();
        ctx.deadline = SystemTime::now() + DISPATCH_DEADLINE;
        let info = rpc::MapInfo {
            files: vec![rpc::MapFileInfo { file, from: 0, to: len }],
        };
        let ok = client.map(ctx, info).await?;
        anyhow::ensure!(ok, "map rpc to {} returned false", worker.address);
    }
}

/// Reduce task `r` is always sent to the worker whose registration id is
/// `r + 1`.
async fn dispatch_reduce_phase(registry: &Arc<Registry>, n_reduce: usize) -> anyhow::Result<()> {
    let mut tasks = tokio::task::JoinSet::new();
    for r in 0..n_reduce {
        let reducer_id = r as i32 + 1;
        let worker = registry
            .worker_by_id(reducer_id)
            .ok_or_else(|| anyhow::anyhow!("no worker registered with id {reducer_id} for reducer {r}"))?;
        let files = registry
            .catalog_for(r)
            .into_iter()
            .map(|(peer_address, filename)| rpc::ReduceFileInfo { peer_address, filename })
            .collect();

        tasks.spawn(async move {
            let client = connect_worker(&worker.address).await?;
            let mut ctx = context::current();
            ctx.deadline = SystemTime::now() + DISPATCH_DEADLINE;
            let ok = client.reduce(ctx, rpc::ReduceInfo { files }).await?;
            anyhow::ensure!(ok, "reduce rpc to {} returned false", worker.address);
            Ok::<(), anyhow::Error>(())
        });
    }

    while let Some(res) = tasks.join_next().await {
        res.context("reduce dispatch task panicked")?
            .map_err(|source| MrError::Rpc { call: "reduce", source })?;
    }
    Ok(())
}

/// Send `end` to every registered worker. Best-effort: a worker that's
/// already gone unreachable doesn't block the others from being told.
async fn teardown(registry: &Arc<Registry>) {
    let workers = registry.snapshot_workers();
    let mut tasks = tokio::task::JoinSet::new();
    for worker in workers {
        tasks.spawn(async move {
            match connect_worker(&worker.address).await {
                Ok(client) => {
                    let _ = client.end(context::current()).await;
                }
                Err(e) => {
                    tracing::debug!(address = %worker.address, error = %e, "could not reach worker to send end");
                }
            }
        });
    }
    while tasks.join_next().await.is_some() {}
}
