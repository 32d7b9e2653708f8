//! Worker state machine and RPC server.
//!
//! State machine: `Registered -> Idle <-> Busy -> Ended`. Entry to `map`
//! or `reduce` transitions to `Busy`; return transitions back to `Idle`.
//! `end` signals the worker's main loop to unwind (see `mr::worker::WorkerNode::wait_for_end`).

mod client;
mod exec;

pub use client::{get_imd_data, MasterRpcClient};

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tarpc::context;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::mr::plugin::Plugin;
use crate::mr::rpc;

/// One worker process's state, shared between its tarpc server handlers
/// (which run one clone per inbound connection, per tarpc convention) and
/// the rest of the process via `Arc`/`Mutex` interior mutability.
#[derive(Clone)]
pub struct WorkerNode {
    uuid: String,
    id: Arc<StdMutex<Option<i32>>>,
    n_reduce: usize,
    store_in_ram: bool,
    plugin: Plugin,
    state: Arc<StdMutex<rpc::WorkerState>>,
    end: Arc<Notify>,
    master: MasterRpcClient,
}

impl WorkerNode {
    pub fn new(plugin: Plugin, n_reduce: usize, store_in_ram: bool, master: MasterRpcClient) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            id: Arc::new(StdMutex::new(None)),
            n_reduce,
            store_in_ram,
            plugin,
            state: Arc::new(StdMutex::new(rpc::WorkerState::Idle)),
            end: Arc::new(Notify::new()),
            master,
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn id(&self) -> Option<i32> {
        *self.id.lock().unwrap()
    }

    pub fn set_id(&self, id: i32) {
        *self.id.lock().unwrap() = Some(id);
    }

    pub fn state(&self) -> rpc::WorkerState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: rpc::WorkerState) {
        *self.state.lock().unwrap() = state;
    }

    /// Resolves once the `end` RPC has been accepted. Callers `select!`
    /// on this to unwind their main loop.
    pub async fn wait_for_end(&self) {
        self.end.notified().await;
    }
}

#[tarpc::server]
impl rpc::Worker for WorkerNode {
    async fn map(self, _: context::Context, info: rpc::MapInfo) -> bool {
        let filenames = match exec::do_map(&self, info).await {
            Ok(filenames) => filenames,
            Err(e) => {
                tracing::error!(worker = %self.uuid, error = %e, "map task failed");
                self.set_state(rpc::WorkerState::Idle);
                return false;
            }
        };

        if let Err(e) = self
            .master
            .update_imd_info(rpc::ImdInfo {
                uuid: self.uuid.clone(),
                filenames: filenames.clone(),
            })
            .await
        {
            tracing::error!(worker = %self.uuid, error = %e, "failed to report intermediate files to master");
            self.set_state(rpc::WorkerState::Idle);
            return false;
        }

        tracing::info!(worker = %self.uuid, shards = filenames.len(), "map task finished");
        true
    }

    async fn reduce(self, _: context::Context, info: rpc::ReduceInfo) -> bool {
        let reducer_id = self.id().unwrap_or(-1);
        match exec::do_reduce(&self, reducer_id, info).await {
            Ok(()) => {
                tracing::info!(worker = %self.uuid, reducer_id, "reduce task finished");
                true
            }
            Err(e) => {
                tracing::error!(worker = %self.uuid, error = %e, "reduce task failed");
                self.set_state(rpc::WorkerState::Idle);
                false
            }
        }
    }

    async fn get_imd_data(self, _: context::Context, loc: rpc::ImdLoc) -> String {
        tracing::trace!(worker = %self.uuid, filename = %loc.filename, "serving intermediate data");
        exec::read_local_shard(&loc.filename).unwrap_or_default()
    }

    async fn health(self, _: context::Context) -> rpc::WorkerState {
        self.state()
    }

    async fn end(self, _: context::Context) {
        tracing::info!(worker = %self.uuid, "received end signal");
        self.end.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mr::plugin;

    #[test]
    fn state_starts_idle_and_id_unset() {
        let master = MasterRpcClient::new("127.0.0.1:0".parse().unwrap());
        let node = WorkerNode::new(plugin::lookup("count").unwrap(), 2, false, master);
        assert_eq!(node.state(), rpc::WorkerState::Idle);
        assert_eq!(node.id(), None);
        node.set_id(3);
        assert_eq!(node.id(), Some(3));
    }
}
