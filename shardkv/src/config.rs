use std::{fmt, sync::Arc};

use labrpc::anyhow::{ensure, Result};

use crate::{membership::Membership, KvClient};

/// Servers of the cluster in index order, the replication factor, and an
/// optional view of which servers are running.
#[derive(Clone)]
pub struct ClusterInfo {
    /// One client per server; the position is the server id.
    pub servers: Vec<KvClient>,
    /// Number of servers responsible for each key.
    pub nreplicas: usize,
    /// When absent, every server counts as running.
    pub membership: Option<Arc<dyn Membership>>,
}

impl ClusterInfo {
    /// Validate and build a configuration without a membership view.
    pub fn new(servers: Vec<KvClient>, nreplicas: usize) -> Result<Self> {
        ensure!(!servers.is_empty(), "a cluster needs at least one server");
        ensure!(
            (1..=servers.len()).contains(&nreplicas),
            "nreplicas must be in 1..={}, got {}",
            servers.len(),
            nreplicas
        );
        Ok(Self {
            servers,
            nreplicas,
            membership: None,
        })
    }

    /// Attach the running-set view servers consult.
    pub fn with_membership(mut self, membership: Arc<dyn Membership>) -> Self {
        self.membership = Some(membership);
        self
    }

    /// Number of servers.
    pub fn nservers(&self) -> usize {
        self.servers.len()
    }

    /// Keys live on more than one server, with responsibility checks and forwarding.
    pub fn replicated(&self) -> bool {
        self.nreplicas > 1
    }

    /// Whether server `id` is running according to the membership view.
    pub fn is_running(&self, id: usize) -> bool {
        self.membership.as_ref().map_or(true, |m| m.is_running(id))
    }
}

impl fmt::Debug for ClusterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterInfo")
            .field(
                "servers",
                &self.servers.iter().map(KvClient::server_id).collect::<Vec<_>>(),
            )
            .field("nreplicas", &self.nreplicas)
            .field("membership", &self.membership.is_some())
            .finish()
    }
}
