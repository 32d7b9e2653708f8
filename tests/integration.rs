//! End-to-end single-machine job runs, covering scenarios S1 through S6:
//! numeric aggregation split across reducers, single-reducer counting,
//! top-n and min/max-range plugins, and the empty-input and
//! worker-count-below-reducer-count boundary cases. Each test writes its
//! own input
//! files under a fresh `tempfile::tempdir()`, `chdir`s into it (master
//! and worker output paths are relative to the process cwd, matching the
//! original's `output/` and `mr-out-*.txt` conventions), and reads back
//! the `mr-out-*.txt` files the job produced.
//!
//! `chdir` is process-wide, so tests that use it serialize behind
//! `DIR_LOCK` to stay safe under `cargo test`'s default parallelism.

use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use mrkit::mr::plugin;
use mrkit::mr::supervisor::{self, RunConfig};

static DIR_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

fn local_addr() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn read_output_files(dir: &Path) -> HashMap<String, String> {
    let mut merged = HashMap::new();
    for entry in fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        let name = entry.file_name().into_string().unwrap();
        if !name.starts_with("mr-out-") {
            continue;
        }
        let content = fs::read_to_string(entry.path()).unwrap();
        for line in content.lines() {
            let (key, value) = line.split_once(' ').expect("output line must be `key value`");
            merged.insert(key.to_string(), value.to_string());
        }
    }
    merged
}

#[tokio::test]
async fn s1_sum_plugin_splits_keys_across_two_reducers() {
    let _guard = DIR_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let prev = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    fs::write(dir.path().join("input.txt"), "1\tA\t3\n2\tB\t5\n3\tA\t4\n").unwrap();

    let config = RunConfig {
        inputs: vec![dir.path().join("input.txt")],
        plugin: plugin::lookup("mysql_agg").unwrap(),
        n_reduce: 2,
        n_worker: 2,
        in_ram: false,
        master_addr: local_addr(),
        cancel: tokio_util::sync::CancellationToken::new(),
    };
    supervisor::run(config).await.unwrap();

    let merged = read_output_files(dir.path());
    std::env::set_current_dir(prev).unwrap();

    assert_eq!(merged.get("A").map(String::as_str), Some("7"));
    assert_eq!(merged.get("B").map(String::as_str), Some("5"));
}

#[tokio::test]
async fn s2_count_plugin_single_reducer_single_worker() {
    let _guard = DIR_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let prev = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    fs::write(dir.path().join("a.txt"), "1\tX\t1\n").unwrap();
    fs::write(dir.path().join("b.txt"), "1\tX\t1\n").unwrap();

    let config = RunConfig {
        inputs: vec![dir.path().join("a.txt"), dir.path().join("b.txt")],
        plugin: plugin::lookup("count").unwrap(),
        n_reduce: 1,
        n_worker: 1,
        in_ram: false,
        master_addr: local_addr(),
        cancel: tokio_util::sync::CancellationToken::new(),
    };
    supervisor::run(config).await.unwrap();

    let out = fs::read_to_string(dir.path().join("mr-out-1.txt")).unwrap();
    std::env::set_current_dir(prev).unwrap();

    assert_eq!(out, "X 2\n");
}

#[tokio::test]
async fn s3_topn_plugin_second_largest() {
    let _guard = DIR_LOCK.lock().await;
    std::env::set_var("MYSQL_TOPN_N", "2");
    let dir = tempfile::tempdir().unwrap();
    let prev = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    fs::write(
        dir.path().join("input.txt"),
        "1\tK\t5\n2\tK\t1\n3\tK\t3\n4\tK\t9\n5\tK\t2\n",
    )
    .unwrap();

    let config = RunConfig {
        inputs: vec![dir.path().join("input.txt")],
        plugin: plugin::lookup("mysql_topn").unwrap(),
        n_reduce: 1,
        n_worker: 1,
        in_ram: false,
        master_addr: local_addr(),
        cancel: tokio_util::sync::CancellationToken::new(),
    };
    supervisor::run(config).await.unwrap();

    let out = fs::read_to_string(dir.path().join("mr-out-1.txt")).unwrap();
    std::env::set_current_dir(prev).unwrap();
    std::env::remove_var("MYSQL_TOPN_N");

    assert_eq!(out, "K 5\n");
}

#[tokio::test]
async fn s4_minmax_plugin_range_mode() {
    let _guard = DIR_LOCK.lock().await;
    std::env::set_var("MYSQL_MINMAX_MODE", "range");
    let dir = tempfile::tempdir().unwrap();
    let prev = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    fs::write(dir.path().join("input.txt"), "1\tK\t4\n2\tK\t10\n3\tK\t2\n4\tK\t7\n").unwrap();

    let config = RunConfig {
        inputs: vec![dir.path().join("input.txt")],
        plugin: plugin::lookup("mysql_minmax").unwrap(),
        n_reduce: 1,
        n_worker: 1,
        in_ram: false,
        master_addr: local_addr(),
        cancel: tokio_util::sync::CancellationToken::new(),
    };
    supervisor::run(config).await.unwrap();

    let out = fs::read_to_string(dir.path().join("mr-out-1.txt")).unwrap();
    std::env::set_current_dir(prev).unwrap();
    std::env::remove_var("MYSQL_MINMAX_MODE");

    assert_eq!(out, "K 8\n");
}

#[tokio::test]
async fn s5_four_keys_split_across_two_workers_sum_to_total() {
    let _guard = DIR_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let prev = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    fs::write(
        dir.path().join("input.txt"),
        "1\ta\t1\n2\tb\t1\n3\tc\t1\n4\td\t1\n",
    )
    .unwrap();

    let config = RunConfig {
        inputs: vec![dir.path().join("input.txt")],
        plugin: plugin::lookup("mysql_agg").unwrap(),
        n_reduce: 2,
        n_worker: 2,
        in_ram: false,
        master_addr: local_addr(),
        cancel: tokio_util::sync::CancellationToken::new(),
    };
    supervisor::run(config).await.unwrap();

    let merged = read_output_files(dir.path());
    std::env::set_current_dir(prev).unwrap();

    assert_eq!(merged.len(), 4);
    let total: i64 = merged.values().map(|v| v.parse::<i64>().unwrap()).sum();
    assert_eq!(total, 4);
}

#[tokio::test]
async fn s6_empty_input_list_returns_success_with_no_files() {
    let _guard = DIR_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let prev = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let config = RunConfig {
        inputs: vec![],
        plugin: plugin::lookup("count").unwrap(),
        n_reduce: 1,
        n_worker: 1,
        in_ram: false,
        master_addr: local_addr(),
        cancel: tokio_util::sync::CancellationToken::new(),
    };
    supervisor::run(config).await.unwrap();

    let wrote_any_output = fs::read_dir(dir.path())
        .unwrap()
        .any(|e| e.unwrap().file_name().to_string_lossy().starts_with("mr-out-"));
    std::env::set_current_dir(prev).unwrap();

    assert!(!wrote_any_output);
}

#[tokio::test]
async fn w_less_than_r_is_a_configuration_error() {
    let _guard = DIR_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("input.txt"), "1\tK\t1\n").unwrap();

    let config = RunConfig {
        inputs: vec![dir.path().join("input.txt")],
        plugin: plugin::lookup("count").unwrap(),
        n_reduce: 3,
        n_worker: 1,
        in_ram: false,
        master_addr: local_addr(),
        cancel: tokio_util::sync::CancellationToken::new(),
    };
    let err = supervisor::run(config).await.unwrap_err();
    assert!(matches!(err, mrkit::mr::error::MrError::Config(_)));
}
