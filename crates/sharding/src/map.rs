use std::collections::BTreeMap;

use crate::error::{Result, ShardError};
use crate::hash::fnv1_32;

/// Immutable snapshot of `{bucket -> server, server -> connection}`.
///
/// `num_servers` is derived from the connection map, so buckets and
/// connections always change together.
#[derive(Debug)]
pub struct ShardMap<Conn> {
    buckets: BTreeMap<u32, String>,
    connections: BTreeMap<String, Conn>,
}

impl<Conn> Default for ShardMap<Conn> {
    fn default() -> Self {
        Self {
            buckets: BTreeMap::new(),
            connections: BTreeMap::new(),
        }
    }
}

impl<Conn: Clone> ShardMap<Conn> {
    pub fn new(buckets: BTreeMap<u32, String>, connections: BTreeMap<String, Conn>) -> Self {
        Self {
            buckets,
            connections,
        }
    }

    pub fn num_servers(&self) -> u32 {
        self.connections.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// `hash(key) mod numServers`, or `None` for an empty map.
    pub fn bucket_for(&self, key: &str) -> Option<u32> {
        match self.num_servers() {
            0 => None,
            n => Some(fnv1_32(key) % n),
        }
    }

    /// Server name owning `key`.
    pub fn server_for(&self, key: &str) -> Result<&str> {
        let bucket = self
            .bucket_for(key)
            .ok_or_else(|| ShardError::ShardUnavailable("no servers configured".to_string()))?;
        self.buckets
            .get(&bucket)
            .map(String::as_str)
            .ok_or_else(|| ShardError::ShardUnavailable(format!("no server for bucket {bucket}")))
    }

    /// Connection owning `key`.
    pub fn resolve(&self, key: &str) -> Result<Conn> {
        let server = self.server_for(key)?;
        self.connections.get(server).cloned().ok_or_else(|| {
            ShardError::ShardUnavailable(format!("no connection for server '{server}'"))
        })
    }

    pub fn buckets(&self) -> &BTreeMap<u32, String> {
        &self.buckets
    }

    pub fn servers(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }

    /// Every `(server, connection)` pair.
    pub fn connections(&self) -> impl Iterator<Item = (&str, &Conn)> {
        self.connections.iter().map(|(s, c)| (s.as_str(), c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(buckets: &[(u32, &str)], servers: &[&str]) -> ShardMap<String> {
        ShardMap::new(
            buckets.iter().map(|(b, s)| (*b, s.to_string())).collect(),
            servers
                .iter()
                .map(|s| (s.to_string(), format!("conn-{s}")))
                .collect(),
        )
    }

    #[test]
    fn test_empty_map_is_unavailable() {
        let empty: ShardMap<String> = ShardMap::default();
        assert_eq!(empty.bucket_for("1"), None);
        assert!(matches!(
            empty.resolve("1"),
            Err(ShardError::ShardUnavailable(_))
        ));
    }

    #[test]
    fn test_resolve_by_bucket() {
        let m = map(&[(0, "s1"), (1, "s2")], &["s1", "s2"]);
        // fnv1_32("1") is even, fnv1_32("2") is odd
        assert_eq!(m.resolve("1").unwrap(), "conn-s1");
        assert_eq!(m.resolve("2").unwrap(), "conn-s2");
    }

    #[test]
    fn test_missing_bucket_entry() {
        let m = map(&[(0, "s1")], &["s1", "s2"]);
        assert!(matches!(m.resolve("2"), Err(ShardError::ShardUnavailable(_))));
    }

    #[test]
    fn test_bucket_pointing_at_unknown_server() {
        let m = map(&[(0, "s1"), (1, "ghost")], &["s1", "s2"]);
        assert!(matches!(m.resolve("2"), Err(ShardError::ShardUnavailable(_))));
        assert!(m.resolve("1").is_ok());
    }
}
