//! Map and reduce task executors.
//!
//! See `worker/worker.go`'s `Map`/`Reduce` methods and its
//! `partialContent`/`writeIMDToLocalFile` helpers; restructured around
//! `tokio` tasks (I/O) and `rayon` (CPU-bound shard writes) rather than
//! bare goroutines.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::task::JoinSet;

use crate::mr::codec::{self, KeyValue};
use crate::mr::partition::partition;
use crate::mr::rpc;
use crate::mr::sink::Sink;

use super::client;
use super::WorkerNode;

/// Read `[from, to)` of `path` into memory. An empty or inverted range
/// (`to <= from`) yields empty content rather than panicking — the
/// engine never constructs such a range itself, but a caller that does
/// must not crash the worker.
async fn partial_content(path: &str, from: u64, to: u64) -> anyhow::Result<String> {
    if to <= from {
        return Ok(String::new());
    }
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening input shard {path}"))?;
    file.seek(SeekFrom::Start(from)).await?;

    let size = (to - from) as usize;
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            // Short read at EOF, tolerated the same way the original
            // tolerates io.ErrUnexpectedEOF from io.ReadFull.
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Run one map task: read every shard, invoke the registered `MapFn`
/// concurrently, partition the emitted pairs into `n_reduce` buckets, and
/// spill each bucket to its own intermediate file. Returns filenames
/// index-aligned with reducer id — position `r` is always reducer `r`'s
/// shard.
pub async fn do_map(node: &WorkerNode, info: rpc::MapInfo) -> anyhow::Result<Vec<String>> {
    node.set_state(rpc::WorkerState::Busy);

    let (sink, mut rx) = Sink::channel();
    let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

    // Drain the sink concurrently with the map tasks below, not after
    // they've all finished: the channel is bounded (sink.rs), so a map
    // invocation emitting more than its capacity would otherwise park
    // the blocking thread on a full channel forever, with nothing left
    // to drain it.
    let n_reduce = node.n_reduce;
    let drain = tokio::spawn(async move {
        let mut buckets: Vec<Vec<KeyValue>> = vec![Vec::new(); n_reduce];
        while let Some(kv) = rx.recv().await {
            let r = partition(&kv.key, n_reduce);
            buckets[r].push(kv);
        }
        buckets
    });

    for file_info in info.files {
        let sink = sink.clone();
        let plugin = node.plugin.clone();
        tasks.spawn(async move {
            let content = partial_content(&file_info.file, file_info.from, file_info.to).await?;
            let filename = file_info.file.clone();
            tokio::task::spawn_blocking(move || {
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    plugin.map.call(&filename, &content, &sink);
                }))
            })
            .await
            .context("map task join failed")?
            .map_err(|_| anyhow::anyhow!("map plugin panicked for {}", file_info.file))?;
            Ok(())
        });
    }
    // Drop our own handle so the channel closes once every spawned
    // clone above has also dropped its sink.
    drop(sink);

    while let Some(res) = tasks.join_next().await {
        res.context("map task panicked")??;
    }

    let buckets = drain.await.context("sink drain task panicked")?;

    let uuid = node.uuid.clone();
    let store_in_ram = node.store_in_ram;
    let filenames = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<String>> {
        use rayon::prelude::*;
        buckets
            .into_par_iter()
            .enumerate()
            .map(|(r, kvs)| write_shard(&uuid, r, &kvs, store_in_ram))
            .collect()
    })
    .await
    .context("shard-write task panicked")??;

    node.set_state(rpc::WorkerState::Idle);
    Ok(filenames)
}

fn intermediate_path(uuid: &str, r: usize, in_ram: bool) -> PathBuf {
    let filename = format!("imd-{uuid}-{r}.txt");
    if in_ram {
        let shm = Path::new("/dev/shm");
        let base = if shm.is_dir() {
            shm.to_path_buf()
        } else {
            std::env::temp_dir()
        };
        base.join(filename)
    } else {
        PathBuf::from("output").join(filename)
    }
}

fn write_shard(uuid: &str, r: usize, kvs: &[KeyValue], in_ram: bool) -> anyhow::Result<String> {
    let content = codec::encode(kvs);
    let path = intermediate_path(uuid, r, in_ram);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating intermediate directory {}", parent.display()))?;
    }
    std::fs::write(&path, content).with_context(|| format!("writing shard {}", path.display()))?;
    Ok(path.to_string_lossy().into_owned())
}

/// Read a previously-spilled intermediate shard, trimmed, for serving
/// over `get_imd_data`.
pub fn read_local_shard(path: &str) -> anyhow::Result<String> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading shard {path}"))?;
    Ok(raw.trim().to_string())
}

/// Run one reduce task: pull every intermediate shard from its owning
/// peer, stable-sort by key, and invoke the registered `ReduceFn` once
/// per distinct key, writing `mr-out-<reducer_id>.txt`.
pub async fn do_reduce(node: &WorkerNode, reducer_id: i32, info: rpc::ReduceInfo) -> anyhow::Result<()> {
    node.set_state(rpc::WorkerState::Busy);

    let mut kvs: Vec<KeyValue> = Vec::new();
    // Serial on purpose: keeping peer pulls sequential removes any risk
    // of the merged stream's order depending on network timing before
    // the sort below.
    for file in &info.files {
        let pulled = client::get_imd_data(&file.peer_address, &file.filename).await?;
        kvs.extend(pulled);
    }

    kvs.sort_by(|a, b| a.key.cmp(&b.key));

    let mut out = String::new();
    let mut i = 0;
    while i < kvs.len() {
        let mut j = i + 1;
        while j < kvs.len() && kvs[j].key == kvs[i].key {
            j += 1;
        }
        let key = kvs[i].key.clone();
        let values: Vec<String> = kvs[i..j].iter().map(|kv| kv.value.clone()).collect();

        let (sink, mut rx) = Sink::channel();
        let plugin = node.plugin.clone();
        let key_for_call = key.clone();
        tokio::task::spawn_blocking(move || {
            plugin.reduce.call(&key_for_call, &values, &sink);
        })
        .await
        .context("reduce task panicked")?;

        let emitted = rx
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("reduce transform for key `{key}` emitted nothing"))?;
        out.push_str(&emitted.key);
        out.push(' ');
        out.push_str(&emitted.value);
        out.push('\n');

        i = j;
    }

    let output_path = format!("mr-out-{reducer_id}.txt");
    tokio::fs::write(&output_path, out)
        .await
        .with_context(|| format!("writing reduce output {output_path}"))?;

    node.set_state(rpc::WorkerState::Idle);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn partial_content_empty_on_inverted_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.txt");
        std::fs::write(&path, "hello world").unwrap();
        let content = partial_content(path.to_str().unwrap(), 5, 2).await.unwrap();
        assert_eq!(content, "");
    }

    #[tokio::test]
    async fn partial_content_reads_exact_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.txt");
        std::fs::write(&path, "hello world").unwrap();
        let content = partial_content(path.to_str().unwrap(), 6, 11).await.unwrap();
        assert_eq!(content, "world");
    }

    #[test]
    fn shard_filenames_are_index_aligned() {
        // store_in_ram=true writes under a fixed system path, so this
        // test doesn't need to touch the process-wide working directory.
        let buckets = vec![
            vec![KeyValue::new("a", "1")],
            vec![KeyValue::new("b", "2")],
            vec![],
        ];
        let filenames: Vec<String> = buckets
            .iter()
            .enumerate()
            .map(|(r, kvs)| write_shard("test-uuid-align", r, kvs, true).unwrap())
            .collect();
        for (r, name) in filenames.iter().enumerate() {
            assert!(name.ends_with(&format!("-{r}.txt")));
        }
    }
}
