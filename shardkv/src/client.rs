use std::{
    future::Future,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use labrpc::anyhow::Result;
use log::{debug, trace};
use rand::Rng;

use super::KvClient;
use crate::{config::ClusterInfo, shard::Shard, GetArgs, PutAppendArgs};

/// Pause between two full passes over the candidate servers.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Random 62-bit client id.
fn nrand() -> u64 {
    rand::thread_rng().gen::<u64>() >> 2
}

/// Client session for a KV cluster.
///
/// Each operation takes the next sequence number of the session and is
/// retried, unchanged, until some candidate server answers. Retries never
/// give up, so a call blocks for as long as no responsible server is
/// reachable. Safe to share between tasks.
#[derive(Debug)]
pub struct Clerk {
    servers: Vec<KvClient>,
    nreplicas: usize,
    client_id: u64,
    seq_num: Mutex<u64>,
}

impl Clerk {
    /// Start a session against `cluster`.
    pub fn new(cluster: &ClusterInfo) -> Self {
        Self {
            servers: cluster.servers.clone(),
            nreplicas: cluster.nreplicas,
            client_id: nrand(),
            seq_num: Mutex::new(0),
        }
    }

    /// Identity of this session on the servers.
    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    /// Current value of `key`, empty if it was never written.
    ///
    /// Fails only if the cluster is replicated and `key` is not an integer.
    pub async fn get(&self, key: &str) -> Result<String> {
        let args = GetArgs {
            key: key.to_string(),
            client_id: self.client_id,
            seq_num: self.next_seq(),
        };
        let candidates = self.candidates(key)?;
        let value = self
            .retry(&candidates, |c| {
                let args = args.clone();
                async move { c.get(args).await.map(|r| r.value) }
            })
            .await;
        Ok(value)
    }

    /// Replace the value of `key`.
    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.put_append(key, value, false).await.map(|_| ())
    }

    /// Append to the value of `key` and return the value it had before.
    pub async fn append(&self, key: &str, value: &str) -> Result<String> {
        self.put_append(key, value, true).await
    }

    async fn put_append(&self, key: &str, value: &str, append: bool) -> Result<String> {
        let args = PutAppendArgs {
            key: key.to_string(),
            value: value.to_string(),
            client_id: self.client_id,
            seq_num: self.next_seq(),
        };
        let candidates = self.candidates(key)?;
        let value = self
            .retry(&candidates, |c| {
                let args = args.clone();
                async move {
                    let reply = if append {
                        c.append(args).await
                    } else {
                        c.put(args).await
                    };
                    reply.map(|r| r.value)
                }
            })
            .await;
        Ok(value)
    }

    /// Only the increment is serialized, never the calls.
    fn next_seq(&self) -> u64 {
        let mut seq = self.seq_num.lock().unwrap_or_else(PoisonError::into_inner);
        *seq += 1;
        *seq
    }

    /// Servers to try, in order: the responsible set when replicated, else all.
    fn candidates(&self, key: &str) -> Result<Vec<usize>> {
        if self.nreplicas > 1 {
            let shard = Shard::of(key, self.servers.len(), self.nreplicas)?;
            Ok(shard.replicas().collect())
        } else {
            Ok((0..self.servers.len()).collect())
        }
    }

    /// First `Some` answer wins. A refusal (`None`) and a failed call are
    /// both dropped in favour of the next candidate.
    async fn retry<T, F, Fut>(&self, candidates: &[usize], rpc: F) -> T
    where
        F: Fn(KvClient) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        loop {
            for &i in candidates {
                match rpc(self.servers[i].clone()).await {
                    Ok(Some(v)) => {
                        trace!("client {} answered by {}", self.client_id, i);
                        return v;
                    }
                    Ok(None) => debug!("client {} refused by {}", self.client_id, i),
                    Err(e) => debug!("client {} call to {} failed: {}", self.client_id, i, e),
                }
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }
}
