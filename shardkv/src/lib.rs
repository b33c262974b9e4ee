#![deny(missing_docs)]
#![deny(clippy::all)]
//! Sharded, replicated in-memory KV store.
//!
//! A key's primary is `key mod nservers`; the `nreplicas` servers starting at
//! the primary are responsible for it. Secondaries forward writes to the
//! primary, and every server suppresses retried requests by remembering the
//! last sequence number and result per client.

use serde::{Deserialize, Serialize};

/// Arguments of a Get.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetArgs {
    /// Key to read.
    pub key: String,
    /// Session that issued the request.
    pub client_id: u64,
    /// Position of the request in its session.
    pub seq_num: u64,
}

/// Reply of a Get. `None` means the server refused to answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetReply {
    /// Current value, empty for a missing key.
    pub value: Option<String>,
}

/// Arguments of a Put or an Append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutAppendArgs {
    /// Key to write.
    pub key: String,
    /// Value to store or to append.
    pub value: String,
    /// Session that issued the request.
    pub client_id: u64,
    /// Position of the request in its session.
    pub seq_num: u64,
}

/// Reply of a Put or an Append. `None` means the server refused to answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutAppendReply {
    /// Value before an Append; empty for a Put.
    pub value: Option<String>,
}

labrpc::service! {
    service kv_service {
        fn get(args: GetArgs) -> GetReply;
        fn put(args: PutAppendArgs) -> PutAppendReply;
        fn append(args: PutAppendArgs) -> PutAppendReply;
    }
}

pub use kv_service::{Client as KvClient, Server as KvServer, Service as KvService};

/// Cluster configuration shared by clerks and servers.
pub mod config;

/// Which servers are up.
pub mod membership;

/// Key to server placement.
pub mod shard;

/// Local map and duplicate detection.
pub mod store;

/// KV Store Server.
pub mod kv;

/// KV Store Client.
pub mod client;

/// Util function for testing.
pub mod tests;

pub use client::Clerk;
pub use config::ClusterInfo;
pub use kv::ReplicaStore;
pub use membership::{Membership, RunningSet};
