use super::KvService;
use crate::{
    config::ClusterInfo,
    shard::Shard,
    store::{KvState, OpKind, Operation},
    GetArgs, GetReply, PutAppendArgs, PutAppendReply,
};

use labrpc::anyhow::{anyhow, ensure, Result};
use log::{debug, trace, warn};
use tokio::sync::Mutex;

/// One server of the cluster.
///
/// Every request runs start to finish under a single lock: membership and
/// responsibility checks, the forward to the primary, duplicate detection and
/// the apply. A forward therefore holds this server's lock, but never the
/// primary's.
pub struct ReplicaStore {
    id: usize,
    cluster: ClusterInfo,
    state: Mutex<KvState>,
}

impl ReplicaStore {
    /// Server `id` of `cluster`, starting empty.
    pub fn new(id: usize, cluster: ClusterInfo) -> Result<Self> {
        ensure!(
            id < cluster.nservers(),
            "server {} outside a cluster of {}",
            id,
            cluster.nservers()
        );
        Ok(Self {
            id,
            cluster,
            state: Mutex::new(KvState::default()),
        })
    }

    /// This server's index.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Value held locally under `key`.
    pub async fn local_value(&self, key: &str) -> Option<String> {
        self.state.lock().await.value(key).map(str::to_string)
    }

    /// Last sequence number this server recorded for `client_id`.
    pub async fn last_seq(&self, client_id: u64) -> Option<u64> {
        self.state.lock().await.last_seq(client_id)
    }

    /// Number of keys held locally.
    pub async fn key_count(&self) -> usize {
        self.state.lock().await.len()
    }

    /// `None` is a refusal: the server is stopped or not responsible for the key.
    async fn serve(&self, op: Operation) -> Result<Option<String>> {
        let mut state = self.state.lock().await;

        if self.cluster.replicated() {
            if !self.cluster.is_running(self.id) {
                debug!("kv-{} not running, refused {:?}", self.id, op);
                return Ok(None);
            }

            let shard = Shard::of(&op.key, self.cluster.nservers(), self.cluster.nreplicas)?;
            if !shard.contains(self.id) {
                debug!("kv-{} not responsible for {:?}, refused", self.id, op.key);
                return Ok(None);
            }

            if op.is_write() && shard.primary() != self.id {
                match self.forward(shard.primary(), &op).await {
                    Ok(Some(value)) => return Ok(Some(value)),
                    Ok(None) => warn!(
                        "kv-{} primary {} refused forward, applying locally",
                        self.id,
                        shard.primary()
                    ),
                    Err(e) => warn!(
                        "kv-{} forward to primary {} failed, applying locally: {}",
                        self.id,
                        shard.primary(),
                        e
                    ),
                }
            }
        }

        let result = state.apply(&op);
        trace!("kv-{} applied {:?} -> {:?}", self.id, op, result);
        Ok(Some(result))
    }

    /// Send a write to its primary. `None` means the primary refused it.
    async fn forward(&self, primary: usize, op: &Operation) -> Result<Option<String>> {
        let peer = self
            .cluster
            .servers
            .get(primary)
            .ok_or_else(|| anyhow!("no server {}", primary))?;
        let args = op
            .to_put_append_args()
            .ok_or_else(|| anyhow!("reads are never forwarded"))?;
        let reply = if matches!(op.kind, OpKind::Append(_)) {
            peer.append(args).await?
        } else {
            peer.put(args).await?
        };
        Ok(reply.value)
    }
}

#[labrpc::async_trait]
impl KvService for ReplicaStore {
    async fn get(&self, args: GetArgs) -> Result<GetReply> {
        let value = self.serve(Operation::get(args)).await?;
        Ok(GetReply { value })
    }

    async fn put(&self, args: PutAppendArgs) -> Result<PutAppendReply> {
        let value = self.serve(Operation::put(args)).await?;
        Ok(PutAppendReply { value })
    }

    async fn append(&self, args: PutAppendArgs) -> Result<PutAppendReply> {
        let value = self.serve(Operation::append(args)).await?;
        Ok(PutAppendReply { value })
    }
}
