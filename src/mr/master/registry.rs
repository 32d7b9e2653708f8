//! Worker registry + intermediate-location catalog, serialized behind one
//! mutex: all mutation of the registry and catalog goes through it.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use tokio::sync::Notify;

use crate::mr::rpc;

#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pub uuid: String,
    pub id: i32,
    pub address: String,
    pub state: rpc::WorkerState,
}

struct Inner {
    workers: Vec<WorkerHandle>,
    n_reduce: usize,
    /// `catalog[r]` is the list of `(owner_address, shard_filename)` for
    /// reducer index `r` (0-based, matching `mr::partition`'s range).
    catalog: Vec<Vec<(String, String)>>,
}

/// Shared master state. A worker's dense id is assigned at registration
/// time, starting at 1: the first `R` successful registrations receive
/// ids `1..=R` by construction (single mutex, ids handed out in
/// registration order). Reducer index `r` (0-based, from
/// `mr::partition`) is always dispatched to the worker whose id is
/// `r + 1`.
pub struct Registry {
    inner: StdMutex<Inner>,
    registered: Notify,
}

impl Registry {
    pub fn new(n_reduce: usize) -> Self {
        Self {
            inner: StdMutex::new(Inner {
                workers: Vec::new(),
                n_reduce,
                catalog: vec![Vec::new(); n_reduce],
            }),
            registered: Notify::new(),
        }
    }

    /// Assigns the next dense id and records the worker. Returns the
    /// assigned id.
    pub fn register(&self, uuid: String, address: String) -> i32 {
        let id = {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.workers.len() as i32 + 1;
            inner.workers.push(WorkerHandle {
                uuid,
                id,
                address,
                state: rpc::WorkerState::Idle,
            });
            id
        };
        self.registered.notify_waiters();
        id
    }

    /// Blocks until at least `n` workers have registered.
    pub async fn wait_for_registrations(&self, n: usize) {
        loop {
            if self.count() >= n {
                return;
            }
            self.registered.notified().await;
        }
    }

    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().workers.len()
    }

    /// Workers in registration order — the order the map-phase
    /// dispatcher walks when first-fitting idle workers.
    pub fn snapshot_workers(&self) -> Vec<WorkerHandle> {
        self.inner.lock().unwrap().workers.clone()
    }

    pub fn worker_by_id(&self, id: i32) -> Option<WorkerHandle> {
        self.inner
            .lock()
            .unwrap()
            .workers
            .iter()
            .find(|w| w.id == id)
            .cloned()
    }

    pub fn set_worker_state(&self, id: i32, state: rpc::WorkerState) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(w) = inner.workers.iter_mut().find(|w| w.id == id) {
            w.state = state;
        }
    }

    /// Record one worker's map-task output: `filenames[r]` is the shard
    /// destined for reducer `r`. Rejects a report whose length doesn't
    /// match `n_reduce` — a worker bug here would silently mis-route
    /// partitions, so it is caught instead of tolerated.
    pub fn record_imd_info(&self, uuid: &str, filenames: Vec<String>) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        anyhow::ensure!(
            filenames.len() == inner.n_reduce,
            "expected {} shard filenames, got {}",
            inner.n_reduce,
            filenames.len()
        );
        let address = inner
            .workers
            .iter()
            .find(|w| w.uuid == uuid)
            .map(|w| w.address.clone())
            .ok_or_else(|| anyhow::anyhow!("update_imd_info from unregistered worker {uuid}"))?;
        for (r, filename) in filenames.into_iter().enumerate() {
            inner.catalog[r].push((address.clone(), filename));
        }
        Ok(())
    }

    /// Every `(peer_address, filename)` pair catalogued for reducer
    /// index `r`.
    pub fn catalog_for(&self, r: usize) -> Vec<(String, String)> {
        self.inner.lock().unwrap().catalog[r].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_assigns_dense_ids_from_one() {
        let reg = Registry::new(2);
        assert_eq!(reg.register("a".into(), "127.0.0.1:1".into()), 1);
        assert_eq!(reg.register("b".into(), "127.0.0.1:2".into()), 2);
        assert_eq!(reg.register("c".into(), "127.0.0.1:3".into()), 3);
    }

    #[test]
    fn imd_info_must_match_reducer_count() {
        let reg = Registry::new(2);
        reg.register("a".into(), "127.0.0.1:1".into());
        assert!(reg.record_imd_info("a", vec!["one.txt".into()]).is_err());
        assert!(reg
            .record_imd_info("a", vec!["one.txt".into(), "two.txt".into()])
            .is_ok());
        assert_eq!(reg.catalog_for(0), vec![("127.0.0.1:1".to_string(), "one.txt".to_string())]);
    }

    #[test]
    fn unregistered_worker_report_is_rejected() {
        let reg = Registry::new(1);
        assert!(reg.record_imd_info("ghost", vec!["x.txt".into()]).is_err());
    }

    #[tokio::test]
    async fn wait_for_registrations_unblocks_once_count_reached() {
        let reg = std::sync::Arc::new(Registry::new(1));
        let reg2 = reg.clone();
        let waiter = tokio::spawn(async move {
            reg2.wait_for_registrations(2).await;
        });
        tokio::task::yield_now().await;
        reg.register("a".into(), "127.0.0.1:1".into());
        reg.register("b".into(), "127.0.0.1:2".into());
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("wait_for_registrations should unblock")
            .unwrap();
    }
}
