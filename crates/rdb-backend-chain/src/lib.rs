#![warn(missing_docs)]
//! The cache-chain backend: an ordered tuple of backends `(C0, …, Cn-1)`
//! where `C0` is fastest and `Cn-1` is authoritative. The chain itself
//! implements [`Backend`], so it composes like any other.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rdb_backend_core::Backend;
use rdb_error::RdbError;

/// An ordered cache chain. Reads probe shallow to deep and promote hits into
/// shallower layers; writes fan out to every layer shallow to deep.
pub struct ChainBackend {
    caches: Vec<(String, Box<dyn Backend>)>,
}

impl ChainBackend {
    /// Build a chain from `(label, backend)` pairs ordered fastest-first.
    /// `label` is only used to key [`Backend::stats`]'s output.
    pub fn new(caches: Vec<(String, Box<dyn Backend>)>) -> Result<Self, RdbError> {
        if caches.is_empty() {
            return Err(RdbError::new(
                rdb_error::ErrorKind::InvalidKey,
                "a cache chain needs at least one backend",
            ));
        }
        Ok(Self { caches })
    }

    fn pull_up_single(&self, upto: usize) -> impl Iterator<Item = &(String, Box<dyn Backend>)> {
        self.caches[..upto].iter()
    }
}

#[async_trait]
impl Backend for ChainBackend {
    fn supports_iteration(&self) -> bool {
        self.caches
            .last()
            .map(|(_, c)| c.supports_iteration())
            .unwrap_or(false)
    }

    async fn raw_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, RdbError> {
        for (depth, (_, cache)) in self.caches.iter().enumerate() {
            match cache.raw_get(key).await? {
                Some(raw) => {
                    // Pull-up: best-effort promotion into shallower layers.
                    // A failed promotion does not fail an otherwise
                    // successful read.
                    for (label, shallow) in self.pull_up_single(depth) {
                        if let Err(e) = shallow.raw_put(key, &raw).await {
                            tracing::warn!(cache = %label, error = %e, "pull-up write failed");
                        }
                    }
                    return Ok(Some(raw));
                }
                // A miss at one layer is normal; the next cache is consulted
                // (NotFound does not short-circuit the probe).
                None => continue,
            }
        }
        Ok(None)
    }

    async fn raw_put(&self, key: &[u8], raw: &[u8]) -> Result<(), RdbError> {
        for (_, cache) in &self.caches {
            cache.raw_put(key, raw).await?;
        }
        Ok(())
    }

    async fn raw_delete(&self, key: &[u8]) -> Result<(), RdbError> {
        for (_, cache) in &self.caches {
            cache.raw_delete(key).await?;
        }
        Ok(())
    }

    async fn raw_get_multi(
        &self,
        keys: &[Vec<u8>],
    ) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, RdbError> {
        let mut unknown: Vec<Vec<u8>> = keys.to_vec();
        let mut found: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        let mut pushups: Vec<BTreeMap<Vec<u8>, Vec<u8>>> =
            (0..self.caches.len()).map(|_| BTreeMap::new()).collect();

        for (depth, (_, cache)) in self.caches.iter().enumerate() {
            if unknown.is_empty() {
                break;
            }
            let batch = cache.raw_get_multi(&unknown).await?;
            if !batch.is_empty() {
                // Schedule pull-up into every cache shallower than `depth`.
                for shallow in pushups.iter_mut().take(depth) {
                    for (k, v) in &batch {
                        shallow.insert(k.clone(), v.clone());
                    }
                }
                unknown.retain(|k| !batch.contains_key(k));
                found.extend(batch);
            }
        }

        for (depth, values) in pushups.into_iter().enumerate() {
            if values.is_empty() {
                continue;
            }
            let (label, cache) = &self.caches[depth];
            if let Err(e) = cache.raw_put_multi(&values).await {
                tracing::warn!(cache = %label, error = %e, "bulk pull-up failed");
            }
        }

        Ok(found)
    }

    async fn raw_put_multi(&self, values: &BTreeMap<Vec<u8>, Vec<u8>>) -> Result<(), RdbError> {
        for (_, cache) in &self.caches {
            cache.raw_put_multi(values).await?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<Vec<u8>>, RdbError> {
        match self.caches.last() {
            Some((_, cache)) if cache.supports_iteration() => cache.keys().await,
            _ => Err(RdbError::not_implemented(
                "no cache in this chain supports iteration",
            )),
        }
    }

    async fn stats(&self) -> Result<BTreeMap<String, serde_json::Value>, RdbError> {
        let mut out = BTreeMap::new();
        for (label, cache) in &self.caches {
            let stats = cache.stats().await?;
            out.insert(
                label.clone(),
                serde_json::Value::Object(stats.into_iter().collect()),
            );
        }
        Ok(out)
    }

    async fn open(&self) -> Result<(), RdbError> {
        for (_, cache) in &self.caches {
            cache.open().await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), RdbError> {
        for (_, cache) in &self.caches {
            cache.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdb_backend_core::GetDefault;
    use std::sync::Mutex;

    /// A minimal in-memory backend used only to exercise chain composition.
    struct MemBackend {
        store: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
        iterable: bool,
    }

    impl MemBackend {
        fn new(iterable: bool) -> Self {
            Self {
                store: Mutex::new(BTreeMap::new()),
                iterable,
            }
        }

        fn contains(&self, key: &[u8]) -> bool {
            self.store.lock().unwrap().contains_key(key)
        }
    }

    #[async_trait]
    impl Backend for MemBackend {
        fn supports_iteration(&self) -> bool {
            self.iterable
        }

        async fn raw_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, RdbError> {
            Ok(self.store.lock().unwrap().get(key).cloned())
        }

        async fn raw_put(&self, key: &[u8], raw: &[u8]) -> Result<(), RdbError> {
            self.store.lock().unwrap().insert(key.to_vec(), raw.to_vec());
            Ok(())
        }

        async fn raw_delete(&self, key: &[u8]) -> Result<(), RdbError> {
            self.store.lock().unwrap().remove(key);
            Ok(())
        }

        async fn keys(&self) -> Result<Vec<Vec<u8>>, RdbError> {
            Ok(self.store.lock().unwrap().keys().cloned().collect())
        }
    }

    fn two_tier() -> (std::sync::Arc<MemBackend>, std::sync::Arc<MemBackend>, ChainBackend) {
        let c0 = std::sync::Arc::new(MemBackend::new(false));
        let c1 = std::sync::Arc::new(MemBackend::new(true));
        let chain = ChainBackend::new(vec![
            ("c0".to_string(), Box::new(ArcBackend(c0.clone()))),
            ("c1".to_string(), Box::new(ArcBackend(c1.clone()))),
        ])
        .unwrap();
        (c0, c1, chain)
    }

    /// Adapts a shared `Arc<MemBackend>` so the test fixtures can both hold
    /// a handle and hand ownership to the chain.
    struct ArcBackend(std::sync::Arc<MemBackend>);

    #[async_trait]
    impl Backend for ArcBackend {
        fn supports_iteration(&self) -> bool {
            self.0.supports_iteration()
        }
        async fn raw_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, RdbError> {
            self.0.raw_get(key).await
        }
        async fn raw_put(&self, key: &[u8], raw: &[u8]) -> Result<(), RdbError> {
            self.0.raw_put(key, raw).await
        }
        async fn raw_delete(&self, key: &[u8]) -> Result<(), RdbError> {
            self.0.raw_delete(key).await
        }
        async fn keys(&self) -> Result<Vec<Vec<u8>>, RdbError> {
            self.0.keys().await
        }
    }

    #[tokio::test]
    async fn miss_at_fast_layer_hit_at_slow_layer_promotes() {
        let (c0, c1, chain) = two_tier();
        c1.put(b"k", Some(b"v")).await.unwrap();
        assert!(!c0.contains(b"k"));

        let got = chain.get(b"k", GetDefault::NotFound).await.unwrap();
        assert_eq!(got, Some(b"v".to_vec()));

        // Testable property 6: the next get for the same key hits C0.
        assert!(c0.contains(b"k"));
    }

    #[tokio::test]
    async fn put_fans_out_to_every_layer() {
        let (c0, c1, chain) = two_tier();
        chain.put(b"k", Some(b"v")).await.unwrap();
        assert!(c0.contains(b"k"));
        assert!(c1.contains(b"k"));
    }

    #[tokio::test]
    async fn delete_fans_out_to_every_layer() {
        let (c0, c1, chain) = two_tier();
        chain.put(b"k", Some(b"v")).await.unwrap();
        chain.raw_delete(b"k").await.unwrap();
        assert!(!c0.contains(b"k"));
        assert!(!c1.contains(b"k"));
    }

    #[tokio::test]
    async fn bulk_get_promotes_found_keys_into_shallower_layers() {
        let (c0, c1, chain) = two_tier();
        c1.raw_put(b"a", b"1").await.unwrap();
        c1.raw_put(b"b", b"2").await.unwrap();

        let result = chain
            .raw_get_multi(&[b"a".to_vec(), b"b".to_vec(), b"c".to_vec()])
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
        assert!(c0.contains(b"a"));
        assert!(c0.contains(b"b"));
    }

    #[tokio::test]
    async fn absent_from_every_layer_is_absent() {
        let (_c0, _c1, chain) = two_tier();
        let got = chain.raw_get(b"nope").await.unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn iteration_is_delegated_to_the_authoritative_layer() {
        let (_c0, c1, chain) = two_tier();
        assert!(chain.supports_iteration());
        c1.raw_put(b"a", b"1").await.unwrap();
        let keys = chain.keys().await.unwrap();
        assert_eq!(keys, vec![b"a".to_vec()]);
    }

    #[tokio::test]
    async fn stats_is_keyed_by_cache_label() {
        let (_c0, _c1, chain) = two_tier();
        let stats = chain.stats().await.unwrap();
        assert!(stats.contains_key("c0"));
        assert!(stats.contains_key("c1"));
    }
}
