//! `mrkit` CLI: the supervisor's front door.
//!
//! `mrkit run` launches master + workers in one process (the common
//! case). `mrkit master` / `mrkit worker` expose the two halves
//! separately for anyone who wants to spread workers across more than
//! one process on the same machine, matching the original's separate
//! `mrcoordinator`/`mrworker` binaries. See
//! `original_source/util.go`'s `ParseArg` flag set and
//! `slab1-MultiOS/distribution/tools/backup_recovery/src/main.rs` for the
//! `clap::Parser`/`Subcommand` shape.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tarpc::{server::incoming::Incoming, tokio_serde::formats::Json};

use mrkit::mr::master::{MasterNode, Registry};
use mrkit::mr::plugin;
use mrkit::mr::rpc;
use mrkit::mr::supervisor::{self, RunConfig};
use mrkit::mr::worker::{MasterRpcClient, WorkerNode};

/// Default master address, used when `--master-addr` is absent and
/// `MRKIT_MASTER_ADDR` is unset — mirrors the original's `MasterIP =
/// ":10000"` default.
const DEFAULT_MASTER_ADDR: &str = "127.0.0.1:10000";

#[derive(Parser)]
#[command(name = "mrkit")]
#[command(about = "Single-machine MapReduce engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a complete job: launch master + N workers in this process.
    Run {
        /// Input files, one map task per file.
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Plugin name, looked up in the built-in registry.
        #[arg(short, long)]
        plugin: String,

        /// Number of reducer partitions.
        #[arg(short = 'r', long = "reduce", default_value_t = 1)]
        n_reduce: usize,

        /// Number of worker processes (must be >= reduce).
        #[arg(short = 'w', long = "worker", default_value_t = 4)]
        n_worker: usize,

        /// Store intermediate shards under /dev/shm instead of output/.
        #[arg(short = 'm', long = "in-ram", default_value_t = true)]
        in_ram: bool,

        /// Address the master listens on.
        #[arg(long)]
        master_addr: Option<SocketAddr>,
    },

    /// Run only the master, for callers driving workers as separate processes.
    Master {
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        #[arg(short = 'r', long = "reduce", default_value_t = 1)]
        n_reduce: usize,

        #[arg(short = 'w', long = "worker", default_value_t = 4)]
        n_worker: usize,

        #[arg(long)]
        master_addr: Option<SocketAddr>,
    },

    /// Run a single worker that registers with an already-running master.
    Worker {
        #[arg(short, long)]
        plugin: String,

        #[arg(short = 'r', long = "reduce", default_value_t = 1)]
        n_reduce: usize,

        #[arg(short = 'm', long = "in-ram", default_value_t = true)]
        in_ram: bool,

        #[arg(long)]
        master_addr: Option<SocketAddr>,

        /// Listen address for this worker; defaults to an OS-assigned port.
        #[arg(long, default_value = "127.0.0.1:0")]
        listen_addr: SocketAddr,
    },
}

fn resolve_master_addr(flag: Option<SocketAddr>) -> anyhow::Result<SocketAddr> {
    if let Some(addr) = flag {
        return Ok(addr);
    }
    let raw = std::env::var("MRKIT_MASTER_ADDR").unwrap_or_else(|_| DEFAULT_MASTER_ADDR.to_string());
    raw.parse()
        .map_err(|e| anyhow::anyhow!("invalid master address `{raw}`: {e}"))
}

/// Distinguishes a malformed plugin name (configuration error) from a
/// well-formed one that just isn't registered (`MrError::UnknownPlugin`).
fn resolve_plugin(name: &str) -> anyhow::Result<plugin::Plugin> {
    if !plugin::valid_identifier(name) {
        return Err(mrkit::mr::error::MrError::Config(format!("invalid plugin identifier `{name}`")).into());
    }
    plugin::lookup(name)
        .ok_or_else(|| mrkit::mr::error::MrError::UnknownPlugin(name.to_string()).into())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            input,
            plugin,
            n_reduce,
            n_worker,
            in_ram,
            master_addr,
        } => run_command(input, plugin, n_reduce, n_worker, in_ram, master_addr).await,
        Commands::Master {
            input,
            n_reduce,
            n_worker,
            master_addr,
        } => master_command(input, n_reduce, n_worker, master_addr).await,
        Commands::Worker {
            plugin,
            n_reduce,
            in_ram,
            master_addr,
            listen_addr,
        } => worker_command(plugin, n_reduce, in_ram, master_addr, listen_addr).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "mrkit job failed");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run_command(
    input: Vec<PathBuf>,
    plugin_name: String,
    n_reduce: usize,
    n_worker: usize,
    in_ram: bool,
    master_addr: Option<SocketAddr>,
) -> anyhow::Result<()> {
    let plugin = resolve_plugin(&plugin_name)?;
    let master_addr = resolve_master_addr(master_addr)?;

    let config = RunConfig {
        inputs: input,
        plugin,
        n_reduce,
        n_worker,
        in_ram,
        master_addr,
        cancel: tokio_util::sync::CancellationToken::new(),
    };
    supervisor::run(config).await?;
    println!("MapReduce job finished; see mr-out-*.txt for results");
    Ok(())
}

async fn master_command(
    input: Vec<PathBuf>,
    n_reduce: usize,
    n_worker: usize,
    master_addr: Option<SocketAddr>,
) -> anyhow::Result<()> {
    let master_addr = resolve_master_addr(master_addr)?;
    let registry = std::sync::Arc::new(Registry::new(n_reduce));

    let listener = tarpc::serde_transport::tcp::listen(master_addr, Json::default).await?;
    tracing::info!(addr = %listener.local_addr(), "master listening");

    let master_node = MasterNode::new(registry.clone());
    let server = tokio::spawn(
        listener
            .filter_map(|r| async { r.ok() })
            .map(tarpc::server::BaseChannel::with_defaults)
            .map(move |channel| channel.execute(master_node.clone().serve()))
            .buffer_unordered(n_worker.max(1))
            .for_each(|_| async {}),
    );

    mrkit::mr::master::scheduler::run_job(&registry, &input, n_reduce, n_worker).await?;
    server.abort();
    println!("master finished dispatching {} reducers", n_reduce);
    Ok(())
}

async fn worker_command(
    plugin_name: String,
    n_reduce: usize,
    in_ram: bool,
    master_addr: Option<SocketAddr>,
    listen_addr: SocketAddr,
) -> anyhow::Result<()> {
    let plugin = resolve_plugin(&plugin_name)?;
    let master_addr = resolve_master_addr(master_addr)?;

    let listener = tarpc::serde_transport::tcp::listen(listen_addr, Json::default).await?;
    let bound_addr = listener.local_addr();
    tracing::info!(addr = %bound_addr, "worker listening");

    let client = MasterRpcClient::new(master_addr);
    let node = WorkerNode::new(plugin, n_reduce, in_ram, client.clone());
    let uuid = node.uuid().to_string();

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
    tracing::info!(worker_uuid = %uuid, id, "worker registered with master");

    let end_signal = {
        let node = node.clone();
        async move { node.wait_for_end().await }
    };

    tokio::select! {
        _ = server => {}
        _ = end_signal => {
            tracing::info!(worker_uuid = %uuid, "worker unwinding after end signal");
        }
    }
    Ok(())
}
