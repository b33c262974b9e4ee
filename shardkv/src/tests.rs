use crate::{Clerk, ClusterInfo, KvClient, KvServer, ReplicaStore, RunningSet};

use labrpc::{anyhow::Result, NetHandle, Network};
use std::sync::Arc;
use tokio::task::{self, JoinHandle};

/// Network name of server `i`.
pub fn server_id(i: usize) -> String {
    format!("kv-{}", i)
}

/// A running cluster of KV servers on one simulated network.
///
/// Dropping it stops the servers and the network.
pub struct Cluster {
    /// Configuration handed to servers and clerks.
    pub info: ClusterInfo,
    /// Direct access to each server's state.
    pub stores: Vec<Arc<ReplicaStore>>,
    /// Membership view the servers consult.
    pub running: RunningSet,
    /// Network controls.
    pub net: NetHandle,
    servers: Vec<JoinHandle<()>>,
    net_thread: JoinHandle<()>,
}

impl Cluster {
    /// A new client session.
    pub fn clerk(&self) -> Clerk {
        Clerk::new(&self.info)
    }

    /// Stop server `i` and cut it off the network.
    pub fn crash(&self, i: usize) {
        self.running.stop(i);
        self.net.enable(&server_id(i), false);
    }

    /// Undo [`Cluster::crash`]. The server keeps the state it had.
    pub fn restart(&self, i: usize) {
        self.net.enable(&server_id(i), true);
        self.running.start(i);
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        for s in &self.servers {
            s.abort();
        }
        self.net_thread.abort();
    }
}

/// Create a cluster of KV store for testing, with every server running.
pub async fn kv_cluster(n: usize, nreplicas: usize) -> Result<Cluster> {
    let mut net = Network::new();

    let clients: Vec<KvClient> = (0..n).map(|i| net.client(server_id(i))).collect();
    let running = RunningSet::all(n);
    let info = ClusterInfo::new(clients, nreplicas)?.with_membership(Arc::new(running.clone()));

    let mut stores = Vec::new();
    let mut servers = Vec::new();

    // Spawn servers.
    for i in 0..n {
        let store = Arc::new(ReplicaStore::new(i, info.clone())?);
        stores.push(store.clone());
        let (_, server_routine) = net
            .register_service::<KvServer<ReplicaStore>, KvClient, _, _>(server_id(i), move || {
                store.clone()
            });
        servers.push(tokio::spawn(server_routine));
    }

    // Wait until servers finish registration.
    let handle = net.handle();
    for i in 0..n {
        while !handle.is_registered(&server_id(i)) {
            task::yield_now().await;
        }
    }
    let net_thread = tokio::spawn(async move {
        net.run().await;
    });

    Ok(Cluster {
        info,
        stores,
        running,
        net: handle,
        servers,
        net_thread,
    })
}

#[cfg(test)]
mod harness {
    use super::*;

    #[tokio::test]
    async fn test_cluster_comes_up() {
        let cluster = kv_cluster(3, 2).await.unwrap();
        assert_eq!(cluster.stores.len(), 3);
        for i in 0..3 {
            assert!(cluster.net.is_registered(&server_id(i)));
            assert_eq!(cluster.stores[i].id(), i);
        }

        cluster.crash(1);
        assert_eq!(cluster.running.running(), vec![0, 2]);
        cluster.restart(1);
        assert_eq!(cluster.running.running(), vec![0, 1, 2]);
    }
}
