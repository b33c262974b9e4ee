use std::{sync::Arc, time::Duration};

use shardkv::{tests::kv_cluster, GetArgs, PutAppendArgs};
use tokio::time::timeout;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn append_args(key: &str, value: &str, client_id: u64, seq_num: u64) -> PutAppendArgs {
    PutAppendArgs {
        key: key.to_string(),
        value: value.to_string(),
        client_id,
        seq_num,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_put_append_get() {
    init_logger();
    let cluster = kv_cluster(3, 1).await.unwrap();
    let ck = cluster.clerk();

    ck.put("3", "a").await.unwrap();
    assert_eq!(ck.get("3").await.unwrap(), "a");
    assert_eq!(ck.append("3", "b").await.unwrap(), "a");
    assert_eq!(ck.get("3").await.unwrap(), "ab");
    assert_eq!(ck.get("8").await.unwrap(), "");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redelivered_append_is_applied_once() {
    init_logger();
    let cluster = kv_cluster(3, 1).await.unwrap();
    let ck = cluster.clerk();
    ck.put("3", "a").await.unwrap();

    let server = &cluster.info.servers[0];
    let args = append_args("3", "b", 42, 1);
    let first = server.append(args.clone()).await.unwrap();
    let second = server.append(args).await.unwrap();
    assert_eq!(first.value.as_deref(), Some("a"));
    assert_eq!(second.value.as_deref(), Some("a"));

    assert_eq!(ck.get("3").await.unwrap(), "ab");

    // The next sequence number is a new operation.
    let third = server.append(append_args("3", "c", 42, 2)).await.unwrap();
    assert_eq!(third.value.as_deref(), Some("ab"));
    assert_eq!(ck.get("3").await.unwrap(), "abc");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_write_to_secondary_reaches_primary() {
    init_logger();
    let cluster = kv_cluster(3, 2).await.unwrap();

    // "4" mod 3 = 1: responsible {1, 2}, primary 1.
    cluster.info.servers[2]
        .put(append_args("4", "v", 42, 1))
        .await
        .unwrap();

    let get = |seq_num| GetArgs {
        key: "4".to_string(),
        client_id: 42,
        seq_num,
    };
    let at_primary = cluster.info.servers[1].get(get(2)).await.unwrap();
    assert_eq!(at_primary.value.as_deref(), Some("v"));
    let at_outsider = cluster.info.servers[0].get(get(3)).await.unwrap();
    assert_eq!(at_outsider.value, None);

    // Clerks ask the primary first.
    assert_eq!(cluster.clerk().get("4").await.unwrap(), "v");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_get_waits_for_a_running_server() {
    init_logger();
    let cluster = kv_cluster(3, 2).await.unwrap();
    let ck = Arc::new(cluster.clerk());
    ck.put("4", "v").await.unwrap();

    for i in 0..3 {
        cluster.running.stop(i);
    }
    let reader = ck.clone();
    let mut pending = tokio::spawn(async move { reader.get("4").await });
    assert!(
        timeout(Duration::from_millis(300), &mut pending).await.is_err(),
        "get returned while no server was running"
    );

    cluster.running.start(1);
    let value = timeout(Duration::from_secs(5), pending)
        .await
        .expect("get still blocked after restart")
        .unwrap()
        .unwrap();
    assert_eq!(value, "v");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_crashed_primary_falls_back_to_secondary() {
    init_logger();
    let cluster = kv_cluster(3, 2).await.unwrap();
    let ck = cluster.clerk();

    cluster.crash(1);
    ck.put("4", "a").await.unwrap();
    assert_eq!(ck.append("4", "b").await.unwrap(), "a");
    assert_eq!(ck.get("4").await.unwrap(), "ab");
    assert_eq!(cluster.stores[2].local_value("4").await.as_deref(), Some("ab"));
    assert_eq!(cluster.stores[1].local_value("4").await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_clerks_on_unreliable_network() {
    const NCLIENTS: usize = 5;
    const NOPS: usize = 10;

    init_logger();
    let cluster = kv_cluster(1, 1).await.unwrap();
    cluster.net.set_reliable(false);

    let mut writers = Vec::new();
    for c in 0..NCLIENTS {
        let ck = cluster.clerk();
        writers.push(tokio::spawn(async move {
            for i in 0..NOPS {
                ck.append("0", &format!("x {} {} y", c, i)).await.unwrap();
            }
        }));
    }
    for w in labrpc::futures::future::join_all(writers).await {
        w.expect("writers should not panic");
    }

    cluster.net.set_reliable(true);
    let value = cluster.clerk().get("0").await.unwrap();
    for c in 0..NCLIENTS {
        let mut last = 0;
        for i in 0..NOPS {
            let needle = format!("x {} {} y", c, i);
            let pos = value
                .find(&needle)
                .unwrap_or_else(|| panic!("missing {:?} in {:?}", needle, value));
            assert_eq!(value.matches(&needle).count(), 1, "{:?} applied twice", needle);
            assert!(pos >= last, "appends of client {} out of order", c);
            last = pos;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_shared_clerk_across_tasks() {
    init_logger();
    let cluster = kv_cluster(3, 3).await.unwrap();
    let ck = Arc::new(cluster.clerk());

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let ck = ck.clone();
            tokio::spawn(async move { ck.append("7", &format!("[{}]", i)).await.unwrap() })
        })
        .collect();
    labrpc::futures::future::join_all(tasks).await;

    let value = ck.get("7").await.unwrap();
    for i in 0..20 {
        assert_eq!(value.matches(&format!("[{}]", i)).count(), 1);
    }
}
