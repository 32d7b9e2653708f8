//! Master: worker registry, intermediate-location catalog, RPC server.
//!
//! Realizes the `rpc::Master` service (`worker_register`,
//! `update_imd_info`); phase sequencing itself lives in
//! [`scheduler`], which drives the Worker RPCs rather than waiting to be
//! polled — the Master pushes task assignments to workers directly
//! instead of workers pulling them.

pub mod registry;
pub mod scheduler;

use std::sync::Arc;

use tarpc::context;

use crate::mr::rpc;

pub use registry::Registry;

/// The RPC server half of the Master. Cheap to clone — every field is
/// `Arc`-backed, since `tarpc` spawns one clone per inbound connection.
#[derive(Clone)]
pub struct MasterNode {
    registry: Arc<Registry>,
}

impl MasterNode {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[tarpc::server]
impl rpc::Master for MasterNode {
    async fn worker_register(self, _: context::Context, info: rpc::WorkerInfo) -> rpc::RegisterResult {
        let id = self.registry.register(info.uuid.clone(), info.address.clone());
        tracing::info!(uuid = %info.uuid, address = %info.address, id, "worker registered");
        rpc::RegisterResult { id, ok: true }
    }

    async fn update_imd_info(self, _: context::Context, info: rpc::ImdInfo) -> bool {
        match self.registry.record_imd_info(&info.uuid, info.filenames) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(uuid = %info.uuid, error = %e, "rejected update_imd_info");
                false
            }
        }
    }
}
