use std::collections::HashMap;

use crate::{GetArgs, PutAppendArgs};

/// What an operation does to its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    /// Read the current value.
    Get,
    /// Replace the value.
    Put(String),
    /// Extend the value, yielding the previous one.
    Append(String),
}

/// One logical client request, identified by `(client_id, seq_num)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Session that issued it.
    pub client_id: u64,
    /// Position in the session.
    pub seq_num: u64,
    /// Target key.
    pub key: String,
    /// Effect.
    pub kind: OpKind,
}

impl Operation {
    /// Build a Get.
    pub fn get(args: GetArgs) -> Self {
        Self {
            client_id: args.client_id,
            seq_num: args.seq_num,
            key: args.key,
            kind: OpKind::Get,
        }
    }

    /// Build a Put.
    pub fn put(args: PutAppendArgs) -> Self {
        Self {
            client_id: args.client_id,
            seq_num: args.seq_num,
            key: args.key,
            kind: OpKind::Put(args.value),
        }
    }

    /// Build an Append.
    pub fn append(args: PutAppendArgs) -> Self {
        Self {
            client_id: args.client_id,
            seq_num: args.seq_num,
            key: args.key,
            kind: OpKind::Append(args.value),
        }
    }

    /// Put and Append change the store, Get does not.
    pub fn is_write(&self) -> bool {
        !matches!(self.kind, OpKind::Get)
    }

    /// Wire form of a write, `None` for a Get.
    pub fn to_put_append_args(&self) -> Option<PutAppendArgs> {
        let value = match &self.kind {
            OpKind::Get => return None,
            OpKind::Put(v) | OpKind::Append(v) => v.clone(),
        };
        Some(PutAppendArgs {
            key: self.key.clone(),
            value,
            client_id: self.client_id,
            seq_num: self.seq_num,
        })
    }
}

/// Keys held by one server, and the last request seen from each client.
///
/// Only the most recent `(seq_num, result)` per client is kept. A request
/// whose sequence number equals it gets the cached result back; any other
/// number, lower ones included, is applied as new.
#[derive(Debug, Default)]
pub struct KvState {
    data: HashMap<String, String>,
    last: HashMap<u64, (u64, String)>,
}

impl KvState {
    /// Apply `op` unless it repeats the client's last request, and return its result.
    pub fn apply(&mut self, op: &Operation) -> String {
        if let Some((seq, result)) = self.last.get(&op.client_id) {
            if *seq == op.seq_num {
                return result.clone();
            }
        }

        let result = match &op.kind {
            OpKind::Get => self.data.get(&op.key).cloned().unwrap_or_default(),
            OpKind::Put(value) => {
                self.data.insert(op.key.clone(), value.clone());
                String::new()
            }
            OpKind::Append(value) => {
                let entry = self.data.entry(op.key.clone()).or_default();
                let old = entry.clone();
                entry.push_str(value);
                old
            }
        };
        self.last.insert(op.client_id, (op.seq_num, result.clone()));
        result
    }

    /// Value stored under `key`, without recording anything.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Last sequence number applied for `client_id`.
    pub fn last_seq(&self, client_id: u64) -> Option<u64> {
        self.last.get(&client_id).map(|(seq, _)| *seq)
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether no key is held.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
