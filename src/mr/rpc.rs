//! RPC surface, realized with `tarpc` service traits in place of the
//! original's hand-generated gRPC stubs. Keeping the engine logic
//! dependent only on these traits — rather than on
//! `tarpc::serde_transport::tcp` directly — is what lets a local-channel
//! transport stand in for tests.

use serde::{Deserialize, Serialize};

/// One worker's registration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub uuid: String,
    pub address: String,
}

/// Response to `worker_register`. `ok = false` is a transient condition
/// (e.g. the preparation phase hasn't finished) the caller should retry;
/// it is distinct from an RPC-level error, which is not retried.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegisterResult {
    pub id: i32,
    pub ok: bool,
}

/// A worker reporting the intermediate shard files it produced during a
/// map task. `filenames[r]` always holds the shard destined for reducer
/// `r` — see `mr::worker`'s map executor for the invariant that keeps
/// this index-aligned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImdInfo {
    pub uuid: String,
    pub filenames: Vec<String>,
}

/// One input shard: a file path plus a byte range `[from, to)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapFileInfo {
    pub file: String,
    pub from: u64,
    pub to: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapInfo {
    pub files: Vec<MapFileInfo>,
}

/// One intermediate shard to pull: which peer owns it, and its filename
/// on that peer's filesystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceFileInfo {
    pub peer_address: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceInfo {
    pub files: Vec<ReduceFileInfo>,
}

/// Locates one intermediate shard file on the worker being asked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImdLoc {
    pub filename: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    Idle,
    Busy,
}

/// RPCs served by the Master: worker registration and the intermediate
/// location catalog update. Phase dispatch is driven by the Master
/// *calling out* to workers via the `Worker` service below — the
/// scheduler pushes task assignments rather than workers polling for
/// them.
#[tarpc::service]
pub trait Master {
    async fn worker_register(info: WorkerInfo) -> RegisterResult;
    async fn update_imd_info(info: ImdInfo) -> bool;
}

/// RPCs served by each Worker.
#[tarpc::service]
pub trait Worker {
    async fn map(info: MapInfo) -> bool;
    async fn reduce(info: ReduceInfo) -> bool;
    async fn get_imd_data(loc: ImdLoc) -> String;
    async fn health() -> WorkerState;
    async fn end();
}
