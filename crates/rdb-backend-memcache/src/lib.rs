#![warn(missing_docs)]
//! The remote memcache backend.
//!
//! Keys are base64-encoded on the wire because memcache rejects arbitrary
//! bytes and whitespace in keys; `open`/`close` drop and rebuild the pooled
//! connections so the backend survives a fork. Iteration is not supported.
//! All memcache calls are blocking socket I/O, so they run on
//! `spawn_blocking`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64;
use rdb_backend_core::Backend;
use rdb_error::RdbError;
use tokio::sync::RwLock;

fn encode_key(key: &[u8]) -> String {
    BASE64.encode(key)
}

fn transport_error(e: impl std::fmt::Display) -> RdbError {
    RdbError::transport(e.to_string())
}

/// A backend fronting one or more memcache servers, addressed by a
/// comma-separated `host:port` list.
pub struct MemcacheBackend {
    servers: Vec<String>,
    client: RwLock<Option<memcache::Client>>,
}

impl MemcacheBackend {
    /// Build a backend from a comma-separated `host:port` server list, e.g.
    /// `"localhost:11211,localhost:11212"`.
    pub fn new(servers: impl Into<String>) -> Self {
        let servers = servers
            .into()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            servers,
            client: RwLock::new(None),
        }
    }

    fn urls(&self) -> Vec<String> {
        self.servers
            .iter()
            .map(|s| format!("memcache://{s}"))
            .collect()
    }

    async fn client(&self) -> Result<memcache::Client, RdbError> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| RdbError::backend_unavailable("memcache backend is not open"))
    }
}

#[async_trait]
impl Backend for MemcacheBackend {
    fn supports_iteration(&self) -> bool {
        false
    }

    async fn open(&self) -> Result<(), RdbError> {
        // Idempotent: drop then rebuild, so a post-fork child gets its own
        // sockets rather than inheriting the parent's.
        *self.client.write().await = None;
        let urls = self.urls();
        let client = memcache::Client::connect(urls).map_err(|e| {
            RdbError::backend_unavailable(format!("failed to connect to memcache: {e}"))
        })?;
        *self.client.write().await = Some(client);
        Ok(())
    }

    async fn close(&self) -> Result<(), RdbError> {
        *self.client.write().await = None;
        Ok(())
    }

    async fn raw_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, RdbError> {
        let client = self.client().await?;
        let encoded = encode_key(key);
        tokio::task::spawn_blocking(move || client.get::<Vec<u8>>(&encoded))
            .await
            .expect("blocking task panicked")
            .map_err(transport_error)
    }

    async fn raw_put(&self, key: &[u8], raw: &[u8]) -> Result<(), RdbError> {
        let client = self.client().await?;
        let encoded = encode_key(key);
        let raw = raw.to_vec();
        tokio::task::spawn_blocking(move || client.set(&encoded, raw.as_slice(), 0))
            .await
            .expect("blocking task panicked")
            .map_err(transport_error)
    }

    async fn raw_delete(&self, key: &[u8]) -> Result<(), RdbError> {
        let client = self.client().await?;
        let encoded = encode_key(key);
        tokio::task::spawn_blocking(move || client.delete(&encoded))
            .await
            .expect("blocking task panicked")
            .map(|_| ())
            .map_err(transport_error)
    }

    async fn raw_get_multi(
        &self,
        keys: &[Vec<u8>],
    ) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, RdbError> {
        let client = self.client().await?;
        let encoded: Vec<String> = keys.iter().map(|k| encode_key(k)).collect();
        let by_encoded: BTreeMap<Vec<u8>, String> =
            keys.iter().cloned().zip(encoded.iter().cloned()).collect();

        let found = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = encoded.iter().map(String::as_str).collect();
            client.gets::<Vec<u8>>(&refs)
        })
        .await
        .expect("blocking task panicked")
        .map_err(transport_error)?;

        let mut out = BTreeMap::new();
        for (key, enc) in by_encoded {
            if let Some(raw) = found.get(&enc) {
                out.insert(key, raw.clone());
            }
        }
        Ok(out)
    }

    async fn stats(&self) -> Result<BTreeMap<String, serde_json::Value>, RdbError> {
        let client = self.client().await?;
        let per_server = tokio::task::spawn_blocking(move || client.stats())
            .await
            .expect("blocking task panicked")
            .map_err(transport_error)?;

        let mut out = BTreeMap::new();
        for (server, stats) in per_server {
            let stats = stats
                .into_iter()
                .map(|(k, v)| (k, serde_json::Value::String(v)))
                .collect();
            out.insert(server, serde_json::Value::Object(stats));
        }
        Ok(out)
    }
}
