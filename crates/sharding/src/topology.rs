//! Wire form of the shard topology.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Bucket table and server endpoints as published in the coordination store.
///
/// ```json
/// {"buckets": {"0": "s1", "1": "s2"}, "servers": {"s1": "postgres://...", "s2": "postgres://..."}}
/// ```
///
/// Routing computes `hash(key) mod servers.len()`, so whoever publishes the
/// document must regenerate `buckets` whenever the server count changes.
/// Always replaced wholesale, never patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardTopology {
    #[serde(default)]
    pub buckets: BTreeMap<u32, String>,
    #[serde(default)]
    pub servers: BTreeMap<String, String>,
}

impl ShardTopology {
    pub fn new(buckets: BTreeMap<u32, String>, servers: BTreeMap<String, String>) -> Self {
        Self { buckets, servers }
    }

    /// Decodes a topology document.
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }

    pub fn num_servers(&self) -> u32 {
        self.servers.len() as u32
    }

    /// Buckets pointing at a server missing from `servers`.
    pub fn dangling_buckets(&self) -> Vec<u32> {
        self.buckets
            .iter()
            .filter(|(_, server)| !self.servers.contains_key(*server))
            .map(|(bucket, _)| *bucket)
            .collect()
    }

    /// Reachable bucket ids (`0..numServers`) with no entry in `buckets`.
    pub fn unassigned_buckets(&self) -> Vec<u32> {
        (0..self.num_servers())
            .filter(|bucket| !self.buckets.contains_key(bucket))
            .collect()
    }

    /// True when every reachable bucket resolves to a known server.
    pub fn is_consistent(&self) -> bool {
        self.unassigned_buckets().is_empty()
            && (0..self.num_servers()).all(|bucket| {
                self.buckets
                    .get(&bucket)
                    .is_some_and(|server| self.servers.contains_key(server))
            })
    }
}

/// One line per server, `server ---> buckets:[..]`, sorted.
impl std::fmt::Display for ShardTopology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut by_server: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
        for (bucket, server) in &self.buckets {
            by_server.entry(server.as_str()).or_default().push(*bucket);
        }
        for (server, buckets) in by_server {
            let listed: Vec<String> = buckets.iter().map(u32::to_string).collect();
            writeln!(f, "{server} ---> buckets:[{}]", listed.join(" "))?;
        }
        Ok(())
    }
}
