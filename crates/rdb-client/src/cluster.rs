//! Multi-node sharding client: parses a cluster spec string into a weighted
//! consistent-hash ring, owns one pooled [`NodeClient`] per node, and
//! fans bulk operations out across nodes in parallel (`spec.md` §4.9).

use std::collections::BTreeMap;

use rdb_codec::Value;
use rdb_error::RdbError;
use rdb_hash::ConsistentHasher;
use rdb_pool::Pool;

use crate::node::{DEFAULT_PORT, NodeClient};

/// Default per-node worker concurrency (`spec.md` §4.10).
pub const DEFAULT_PER_NODE_CONCURRENCY: usize = 5;

fn normalize_addr(addr: &str) -> Result<String, RdbError> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(RdbError::invalid_key("empty node address in cluster spec"));
    }
    if addr.contains(':') {
        Ok(addr.to_string())
    } else {
        Ok(format!("{addr}:{DEFAULT_PORT}"))
    }
}

/// Parse a cluster spec string into `(address, weight)` pairs
/// (`spec.md` §4.9 / §6: `host[:port][,weight][;host[:port][,weight]…]`).
fn parse_spec(spec: &str) -> Result<Vec<(String, u32)>, RdbError> {
    if spec.trim().is_empty() {
        return Err(RdbError::invalid_key("empty cluster spec"));
    }
    if !spec.contains(';') {
        return Ok(vec![(normalize_addr(spec)?, 1)]);
    }
    spec.split(';')
        .map(|part| {
            let mut fields = part.splitn(2, ',');
            let addr = normalize_addr(fields.next().unwrap_or(""))?;
            let weight = match fields.next() {
                Some(w) => w.trim().parse::<u32>().map_err(|_| {
                    RdbError::invalid_key(format!("invalid weight '{w}' in cluster spec"))
                })?,
                None => 1,
            };
            Ok((addr, weight))
        })
        .collect()
}

/// A cluster of RDB nodes, sharded by weighted consistent hashing.
pub struct Cluster {
    hasher: ConsistentHasher<String>,
    pools: BTreeMap<String, Pool<NodeClient>>,
}

impl Cluster {
    /// Build a cluster from a spec string, with the default per-node
    /// worker concurrency.
    pub fn from_spec(spec: &str) -> Result<Self, RdbError> {
        Self::with_concurrency(spec, DEFAULT_PER_NODE_CONCURRENCY)
    }

    /// Build a cluster from a spec string, with `per_node` workers per
    /// node (the overall pool size is `nodes × per_node`, `spec.md` §4.10).
    pub fn with_concurrency(spec: &str, per_node: usize) -> Result<Self, RdbError> {
        let nodes = parse_spec(spec)?;
        let mut pools = BTreeMap::new();
        for (addr, _weight) in &nodes {
            let client = NodeClient::new(addr);
            let pool = Pool::new((0..per_node.max(1)).map(|_| client.clone()).collect());
            pools.insert(addr.clone(), pool);
        }
        let hasher = ConsistentHasher::new(nodes)?;
        Ok(Self { hasher, pools })
    }

    /// The node address a key is sharded to.
    pub fn node_for(&self, key: &[u8]) -> &str {
        self.hasher.node_for(key)
    }

    fn pool_for(&self, key: &[u8]) -> &Pool<NodeClient> {
        &self.pools[self.hasher.node_for(key)]
    }

    /// The cluster's single node's pool, if it has exactly one. The
    /// original client never exposed `keys`/`items`/`stats` on its
    /// multi-node client (only the single-node client has them), so these
    /// iteration-style calls are only meaningful for a single-node spec.
    fn sole_pool(&self) -> Result<&Pool<NodeClient>, RdbError> {
        if self.pools.len() != 1 {
            return Err(RdbError::not_implemented(
                "iteration and stats are only supported for a single-node cluster spec",
            ));
        }
        Ok(self.pools.values().next().expect("checked len == 1"))
    }

    /// Forward to the sole node's `all_keys`.
    pub async fn all_keys(&self) -> Result<Vec<Vec<u8>>, RdbError> {
        self.sole_pool()?.checkout().await.all_keys().await
    }

    /// Forward to the sole node's `all_data`.
    pub async fn all_data(&self) -> Result<BTreeMap<Vec<u8>, Value>, RdbError> {
        self.sole_pool()?.checkout().await.all_data().await
    }

    /// Forward to the sole node's `stats`.
    pub async fn stats(&self) -> Result<serde_json::Value, RdbError> {
        self.sole_pool()?.checkout().await.stats().await
    }

    /// Forward to `clients[hasher(key)].get`.
    pub async fn get(&self, key: &[u8]) -> Result<Value, RdbError> {
        self.pool_for(key).checkout().await.get(key).await
    }

    /// Forward to `clients[hasher(key)].put`.
    pub async fn put(&self, key: &[u8], value: &Value) -> Result<(), RdbError> {
        self.pool_for(key).checkout().await.put(key, value).await
    }

    /// Forward to `clients[hasher(key)].delete`.
    pub async fn delete(&self, key: &[u8]) -> Result<(), RdbError> {
        self.pool_for(key).checkout().await.delete(key).await
    }

    fn group_by_node(&self, keys: &[Vec<u8>]) -> BTreeMap<String, Vec<Vec<u8>>> {
        let mut by_node: BTreeMap<String, Vec<Vec<u8>>> = BTreeMap::new();
        for key in keys {
            by_node
                .entry(self.hasher.node_for(key).clone())
                .or_default()
                .push(key.clone());
        }
        by_node
    }

    /// Group keys by target node, dispatch per-node bulk gets in parallel,
    /// and merge results into a single mapping. If more than one per-node
    /// request fails, the first captured error is returned after every
    /// request has completed (`spec.md` §4.9 / §7).
    pub async fn get_multi(&self, keys: &[Vec<u8>]) -> Result<BTreeMap<Vec<u8>, Value>, RdbError> {
        let by_node = self.group_by_node(keys);
        let futures = by_node.into_iter().map(|(node, node_keys)| async move {
            self.pools[&node].checkout().await.get_multi(&node_keys).await
        });
        let results = futures::future::join_all(futures).await;

        let mut merged = BTreeMap::new();
        let mut first_err = None;
        for r in results {
            match r {
                Ok(map) => merged.extend(map),
                Err(e) if first_err.is_none() => first_err = Some(e),
                Err(_) => {}
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(merged),
        }
    }

    /// Group values by target node and dispatch per-node bulk puts in
    /// parallel.
    pub async fn put_multi(&self, values: &BTreeMap<Vec<u8>, Value>) -> Result<(), RdbError> {
        let mut by_node: BTreeMap<String, BTreeMap<Vec<u8>, Value>> = BTreeMap::new();
        for (key, value) in values {
            by_node
                .entry(self.hasher.node_for(key).clone())
                .or_default()
                .insert(key.clone(), value.clone());
        }
        let futures = by_node.into_iter().map(|(node, node_values)| async move {
            self.pools[&node]
                .checkout()
                .await
                .put_multi(&node_values)
                .await
        });
        let results = futures::future::join_all(futures).await;
        first_error(results)
    }

    /// Group keys by target node and dispatch per-node bulk deletes in
    /// parallel.
    pub async fn delete_multi(&self, keys: &[Vec<u8>]) -> Result<(), RdbError> {
        let by_node = self.group_by_node(keys);
        let futures = by_node.into_iter().map(|(node, node_keys)| async move {
            self.pools[&node].checkout().await.delete_multi(&node_keys).await
        });
        let results = futures::future::join_all(futures).await;
        first_error(results)
    }
}

fn first_error(results: Vec<Result<(), RdbError>>) -> Result<(), RdbError> {
    results.into_iter().find(Result::is_err).unwrap_or(Ok(()))
}
