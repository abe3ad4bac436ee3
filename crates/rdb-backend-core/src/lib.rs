#![warn(missing_docs)]
//! The storage backend contract: primitive byte-level operations, the
//! none-sentinel that lets a backend distinguish "stored null" from
//! "absent", and the sentinel-aware default implementations of the richer
//! `get`/`put`/`get_multi`/`put_multi` operations, derived from those
//! primitives so a backend only has to implement the primitives.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rdb_error::RdbError;

mod sentinel;
pub use sentinel::{unwrap_raw, wrap_raw};

/// The default selecting what a single-key `get` does when the key is
/// absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetDefault {
    /// Fail with [`ErrorKind::NotFound`].
    NotFound,
    /// Return this value instead (`None` means "stored null").
    Value(Option<Vec<u8>>),
}

/// The default selecting what a bulk `get_multi` does with keys that are
/// absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultiDefault {
    /// Fail the whole call with [`ErrorKind::NotFound`] if any key is absent.
    NotFound,
    /// Omit absent keys from the result map.
    NoInclude,
    /// Fill absent keys with this value (`None` means "stored null").
    Value(Option<Vec<u8>>),
}

/// A key that is non-empty and ASCII, as required at every protocol
/// boundary (`spec.md` §3: "text keys are interpreted as their ASCII
/// bytes; unicode keys outside ASCII are rejected").
pub fn validate_key(key: &[u8]) -> Result<(), RdbError> {
    if key.is_empty() {
        return Err(RdbError::invalid_key("key must not be empty"));
    }
    if !key.is_ascii() {
        return Err(RdbError::invalid_key("key must be ASCII"));
    }
    Ok(())
}

/// The storage backend contract.
///
/// Implementors provide the three primitives (`raw_get`, `raw_put`,
/// `raw_delete`) plus lifecycle/`stats`/iteration hooks; the richer
/// `get`/`put`/`get_multi`/`put_multi`/`items` operations have sentinel-aware
/// default implementations derived from the primitives, matching the
/// `_get`/`_put`/`_get_multi`/`_put_multi` split in the component design.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Whether `keys()`/`items()` are meaningful for this backend.
    fn supports_iteration(&self) -> bool {
        false
    }

    /// Fetch the raw, sentinel-wrapped bytes for `key`, or `None` if absent.
    /// See [`wrap_raw`]/[`unwrap_raw`] for the wrapping.
    async fn raw_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, RdbError>;

    /// Store the raw, sentinel-wrapped bytes for `key`.
    async fn raw_put(&self, key: &[u8], raw: &[u8]) -> Result<(), RdbError>;

    /// Remove `key`. Absent is not an error.
    async fn raw_delete(&self, key: &[u8]) -> Result<(), RdbError>;

    /// Boolean membership test. Default: a `raw_get` and discard the value.
    async fn has(&self, key: &[u8]) -> Result<bool, RdbError> {
        Ok(self.raw_get(key).await?.is_some())
    }

    /// All keys currently stored, if [`Backend::supports_iteration`].
    async fn keys(&self) -> Result<Vec<Vec<u8>>, RdbError> {
        Err(RdbError::not_implemented("this backend does not support iteration"))
    }

    /// Backend-native diagnostics. Default: empty.
    async fn stats(&self) -> Result<BTreeMap<String, serde_json::Value>, RdbError> {
        Ok(BTreeMap::new())
    }

    /// Acquire resources. Must be idempotent and safe to call again after a
    /// fork-like boundary without an intervening `close`.
    async fn open(&self) -> Result<(), RdbError> {
        Ok(())
    }

    /// Release resources. Must be idempotent.
    async fn close(&self) -> Result<(), RdbError> {
        Ok(())
    }

    /// Batch form of `raw_get`. Default: repeated `raw_get`.
    async fn raw_get_multi(
        &self,
        keys: &[Vec<u8>],
    ) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, RdbError> {
        let mut out = BTreeMap::new();
        for key in keys {
            if let Some(raw) = self.raw_get(key).await? {
                out.insert(key.clone(), raw);
            }
        }
        Ok(out)
    }

    /// Batch form of `raw_put`. Default: repeated `raw_put`.
    async fn raw_put_multi(&self, values: &BTreeMap<Vec<u8>, Vec<u8>>) -> Result<(), RdbError> {
        for (key, raw) in values {
            self.raw_put(key, raw).await?;
        }
        Ok(())
    }

    /// Fetch a value, applying `default` when `key` is absent.
    ///
    /// `Ok(None)` means the stored value is a distinguished null, not that
    /// the key is absent — absence is signalled by the `NotFound` error or
    /// by returning `default` as `GetDefault::Value`.
    async fn get(&self, key: &[u8], default: GetDefault) -> Result<Option<Vec<u8>>, RdbError> {
        match self.raw_get(key).await? {
            Some(raw) => unwrap_raw(&raw),
            None => match default {
                GetDefault::NotFound => Err(RdbError::not_found(format!(
                    "no value for key {:?}",
                    String::from_utf8_lossy(key)
                ))),
                GetDefault::Value(v) => Ok(v),
            },
        }
    }

    /// Store a value; `None` stores a distinguished null.
    async fn put(&self, key: &[u8], value: Option<&[u8]>) -> Result<(), RdbError> {
        self.raw_put(key, &wrap_raw(value)).await
    }

    /// Fetch many values at once, applying `default` per absent key.
    async fn get_multi(
        &self,
        keys: &[Vec<u8>],
        default: MultiDefault,
    ) -> Result<BTreeMap<Vec<u8>, Option<Vec<u8>>>, RdbError> {
        // Dedupe while preserving determinism; callers may pass repeats.
        let mut unique: Vec<Vec<u8>> = Vec::new();
        for k in keys {
            if !unique.contains(k) {
                unique.push(k.clone());
            }
        }

        let found = self.raw_get_multi(&unique).await?;
        let mut result = BTreeMap::new();
        for key in &unique {
            match found.get(key) {
                Some(raw) => {
                    result.insert(key.clone(), unwrap_raw(raw)?);
                }
                None => match &default {
                    MultiDefault::NotFound => {
                        return Err(RdbError::not_found(format!(
                            "no value for key {:?}",
                            String::from_utf8_lossy(key)
                        )));
                    }
                    MultiDefault::NoInclude => {}
                    MultiDefault::Value(v) => {
                        result.insert(key.clone(), v.clone());
                    }
                },
            }
        }
        Ok(result)
    }

    /// Store many values at once; `None` stores a distinguished null.
    async fn put_multi(&self, values: &BTreeMap<Vec<u8>, Option<Vec<u8>>>) -> Result<(), RdbError> {
        let wrapped: BTreeMap<Vec<u8>, Vec<u8>> = values
            .iter()
            .map(|(k, v)| (k.clone(), wrap_raw(v.as_deref())))
            .collect();
        self.raw_put_multi(&wrapped).await
    }

    /// All `(key, value)` pairs, if [`Backend::supports_iteration`]. Default:
    /// built from `keys()` followed by a `get` per key.
    async fn items(&self) -> Result<BTreeMap<Vec<u8>, Option<Vec<u8>>>, RdbError> {
        let keys = self.keys().await?;
        let mut out = BTreeMap::new();
        for key in keys {
            let value = self.get(&key, GetDefault::NotFound).await?;
            out.insert(key, value);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdb_error::ErrorKind;
    use std::sync::Mutex;

    /// An in-memory `Backend` used only to exercise the default methods.
    struct MemBackend {
        store: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
    }

    impl MemBackend {
        fn new() -> Self {
            Self {
                store: Mutex::new(BTreeMap::new()),
            }
        }
    }

    #[async_trait]
    impl Backend for MemBackend {
        fn supports_iteration(&self) -> bool {
            true
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

    #[tokio::test]
    async fn round_trip() {
        let b = MemBackend::new();
        b.put(b"k", Some(b"v")).await.unwrap();
        assert_eq!(
            b.get(b"k", GetDefault::NotFound).await.unwrap(),
            Some(b"v".to_vec())
        );
    }

    #[tokio::test]
    async fn null_is_distinguishable_from_absent() {
        let b = MemBackend::new();
        b.put(b"k", None).await.unwrap();
        assert_eq!(b.get(b"k", GetDefault::NotFound).await.unwrap(), None);

        b.raw_delete(b"k").await.unwrap();
        let err = b.get(b"k", GetDefault::NotFound).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn get_with_default_value() {
        let b = MemBackend::new();
        let got = b
            .get(b"missing", GetDefault::Value(Some(b"fallback".to_vec())))
            .await
            .unwrap();
        assert_eq!(got, Some(b"fallback".to_vec()));
    }

    #[tokio::test]
    async fn get_multi_no_include_omits_absent_keys() {
        let b = MemBackend::new();
        b.put(b"a", Some(b"1")).await.unwrap();
        let result = b
            .get_multi(&[b"a".to_vec(), b"b".to_vec()], MultiDefault::NoInclude)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.get(b"a".as_slice()), Some(&Some(b"1".to_vec())));
    }

    #[tokio::test]
    async fn get_multi_null_is_present_not_omitted() {
        let b = MemBackend::new();
        b.put(b"a", None).await.unwrap();
        let result = b
            .get_multi(&[b"a".to_vec()], MultiDefault::NoInclude)
            .await
            .unwrap();
        assert_eq!(result.get(b"a".as_slice()), Some(&None));
    }

    #[tokio::test]
    async fn get_multi_not_found_default_fails_whole_call() {
        let b = MemBackend::new();
        let err = b
            .get_multi(&[b"missing".to_vec()], MultiDefault::NotFound)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn items_is_built_from_keys_and_get() {
        let b = MemBackend::new();
        b.put(b"a", Some(b"1")).await.unwrap();
        b.put(b"b", Some(b"2")).await.unwrap();
        let items = b.items().await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn empty_key_is_invalid() {
        let err = validate_key(b"").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidKey);
    }

    #[test]
    fn non_ascii_key_is_invalid() {
        let err = validate_key("héllo".as_bytes()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidKey);
    }
}
