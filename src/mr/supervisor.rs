//! Single-machine driver: launches a Master and `w` Workers in one
//! address space, picks worker listening ports with retry, and waits for
//! the job to run to completion.
//!
//! See `original_source/singleMachine.go`'s `singleMachineJob`
//! and `util.go`'s `startWorkerWithRetryE`/`startSingleMachineWorkerWithMaster`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use tarpc::{server::incoming::Incoming, tokio_serde::formats::Json};
use tokio_util::sync::CancellationToken;

use crate::mr::error::{MrError, Result as MrResult};
use crate::mr::master::{scheduler, MasterNode, Registry};
use crate::mr::plugin::Plugin;
use crate::mr::rpc;
use crate::mr::worker::{MasterRpcClient, WorkerNode};

/// Consecutive candidate ports tried per worker before giving up, mirroring
/// `original_source/util.go`'s `startWorkerWithRetryE`'s `maxAttempts`.
const WORKER_PORT_ATTEMPTS: u32 = 128;

/// Configuration for one single-machine job. Threaded explicitly rather
/// than read from process-wide globals, in place of the original's
/// `MasterIP` global.
pub struct RunConfig {
    pub inputs: Vec<PathBuf>,
    pub plugin: Plugin,
    pub n_reduce: usize,
    pub n_worker: usize,
    pub in_ram: bool,
    pub master_addr: SocketAddr,
    /// Lets a caller abandon an in-flight `run()`; pending RPCs are not
    /// cooperatively aborted, the token only short-circuits the wait once
    /// observed.
    pub cancel: CancellationToken,
}

/// Runs one job to completion: start the Master, start `n_worker`
/// Workers, wait until the Master's scheduler and every Worker's main
/// loop have unwound. Returns the first error observed from any party.
///
/// A caller wanting to serialize job runs within one process should wrap
/// this call in its own `Arc<tokio::sync::Mutex<()>>` — the original's
/// `runtimeMu` is not reproduced as global state here.
pub async fn run(config: RunConfig) -> MrResult<()> {
    if config.inputs.is_empty() {
        return Ok(());
    }
    if config.n_reduce == 0 {
        return Err(MrError::Config("n_reduce must be >= 1".into()));
    }
    if config.n_worker < config.n_reduce {
        return Err(MrError::Config(format!(
            "need at least {} workers to cover {} reducers, got {}",
            config.n_reduce, config.n_reduce, config.n_worker
        )));
    }

    let registry = Arc::new(Registry::new(config.n_reduce));
    let master_listener = tarpc::serde_transport::tcp::listen(config.master_addr, Json::default)
        .await
        .map_err(|source| MrError::Rpc { call: "master listen", source: source.into() })?;
    let master_addr = master_listener.local_addr();

    let master_node = MasterNode::new(registry.clone());
    let master_server = tokio::spawn(
        master_listener
            .filter_map(|r| async { r.ok() })
            .map(tarpc::server::BaseChannel::with_defaults)
            .map(move |channel| channel.execute(master_node.clone().serve()))
            .buffer_unordered(config.n_worker.max(1))
            .for_each(|_| async {}),
    );

    let mut worker_tasks = tokio::task::JoinSet::new();
    for i in 0..config.n_worker {
        let plugin = config.plugin.clone();
        let master_addr = master_addr;
        worker_tasks.spawn(run_single_worker(i, config.n_worker, master_addr, config.n_reduce, config.in_ram, plugin));
    }

    let job = tokio::spawn({
        let registry = registry.clone();
        let inputs = config.inputs.clone();
        let n_reduce = config.n_reduce;
        let n_worker = config.n_worker;
        async move { scheduler::run_job(&registry, &inputs, n_reduce, n_worker).await }
    });

    tokio::select! {
        res = job => {
            let job_result = res.map_err(|source| MrError::Rpc { call: "scheduler join", source: source.into() })?;
            job_result.map_err(|source| MrError::Rpc { call: "scheduler", source })?;
        }
        _ = config.cancel.cancelled() => {
            master_server.abort();
            return Err(MrError::Cancelled);
        }
    }

    while let Some(res) = worker_tasks.join_next().await {
        res.map_err(|source| MrError::Rpc { call: "worker join", source: source.into() })?
            .map_err(|source| MrError::Rpc { call: "worker", source })?;
    }

    master_server.abort();
    Ok(())
}

/// Starts one worker: binds a listening port by scanning disjoint
/// candidates (`master_port + index + 1`, stepping by `n_worker`),
/// registers with the master, serves RPCs until `end`, and returns once
/// its main loop has unwound.
async fn run_single_worker(
    index: usize,
    n_worker: usize,
    master_addr: SocketAddr,
    n_reduce: usize,
    in_ram: bool,
    plugin: Plugin,
) -> anyhow::Result<()> {
    let start_port = master_addr.port() as u32 + index as u32 + 1;
    let step = n_worker.max(1) as u32;

    let (listener, bound_addr) = {
        let mut last_err: Option<std::io::Error> = None;
        let mut bound = None;
        for attempt in 0..WORKER_PORT_ATTEMPTS {
            let port = (start_port + attempt * step) % 65535;
            if port == 0 {
                continue;
            }
            let addr = SocketAddr::new(master_addr.ip(), port as u16);
            match tarpc::serde_transport::tcp::listen(addr, Json::default).await {
                Ok(listener) => {
                    let local = listener.local_addr();
                    bound = Some((listener, local));
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    tracing::debug!(port, "worker port occupied, trying next candidate");
                    last_err = Some(e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        bound.ok_or_else(|| {
            let err = MrError::PortExhausted {
                start: start_port as u16,
                attempts: WORKER_PORT_ATTEMPTS,
            };
            match last_err {
                Some(io_err) => anyhow::Error::new(err).context(io_err),
                None => anyhow::Error::new(err),
            }
        })?
    };

    let client = MasterRpcClient::new(master_addr);
    let node = WorkerNode::new(plugin, n_reduce, in_ram, client.clone());
    let uuid = node.uuid().to_string();

    let end_signal = {
        let node = node.clone();
        async move { node.wait_for_end().await }
    };

    let server = {
        let node = node.clone();
        async move {
            listener
                .filter_map(|r| async { r.ok() })
                .map(tarpc::server::BaseChannel::with_defaults)
                .map(move |channel| channel.execute(node.clone().serve()))
                .buffer_unordered(8)
                .for_each(|_| async {})
                .await
        }
    };

    let id = client
        .register(rpc::WorkerInfo {
            uuid: uuid.clone(),
            address: bound_addr.to_string(),
        })
        .await?;
    node.set_id(id);
    tracing::info!(worker_uuid = %uuid, id, address = %bound_addr, "worker registered with master");

    tokio::select! {
        _ = server => {}
        _ = end_signal => {
            tracing::info!(worker_uuid = %uuid, "worker unwinding after end signal");
        }
    }
    Ok(())
}

