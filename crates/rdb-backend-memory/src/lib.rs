#![warn(missing_docs)]
//! The embedded hash-DB backend: a single-process disk hash table with a
//! shared-environment attach key, over `sled`.
//!
//! `sled` has no literal shared-memory segment (it is a single-writer
//! embedded store, not a multi-process one), so `shmkey` is preserved as the
//! integer parameter the spec requires and is mapped onto a deterministic
//! on-disk subdirectory: two backends constructed with the same
//! `(basedir, shmkey)` attach to the same `sled::Db`; two with different
//! `shmkey`s never collide. This satisfies the invariant the original
//! shared-memory design existed for, without claiming cross-process
//! attachment `sled` cannot provide.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rdb_backend_core::Backend;
use rdb_error::RdbError;
use tokio::sync::RwLock;

/// An embedded, disk-backed backend. `basedir` must exist; `shmkey`
/// identifies which on-disk store this instance attaches to.
pub struct MemoryBackend {
    basedir: PathBuf,
    shmkey: u64,
    db: RwLock<Option<sled::Db>>,
}

impl MemoryBackend {
    /// Construct a backend over `basedir/shm-{shmkey}`. Does not touch disk
    /// until [`Backend::open`] is called.
    pub fn new(basedir: impl Into<PathBuf>, shmkey: u64) -> Self {
        Self {
            basedir: basedir.into(),
            shmkey,
            db: RwLock::new(None),
        }
    }

    /// The deterministic store directory for this `(basedir, shmkey)` pair.
    pub fn store_path(&self) -> PathBuf {
        self.basedir.join(format!("shm-{}", self.shmkey))
    }

    fn require_basedir(&self) -> Result<(), RdbError> {
        if !self.basedir.is_dir() {
            return Err(RdbError::backend_unavailable(format!(
                "basedir {:?} does not exist",
                self.basedir
            )));
        }
        Ok(())
    }

    async fn db(&self) -> Result<sled::Db, RdbError> {
        let guard = self.db.read().await;
        guard.clone().ok_or_else(|| {
            RdbError::backend_unavailable("embedded backend is not open; call open() first")
        })
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn supports_iteration(&self) -> bool {
        true
    }

    async fn open(&self) -> Result<(), RdbError> {
        // Idempotent: a second open() while already open is a no-op, so a
        // post-fork child can reopen without first closing (`spec.md` §9).
        if self.db.read().await.is_some() {
            return Ok(());
        }
        self.require_basedir()?;
        let path = self.store_path();
        let db = sled::open(&path).map_err(|e| {
            RdbError::backend_unavailable(format!("failed to open sled store at {path:?}: {e}"))
                .with_source(e)
        })?;
        *self.db.write().await = Some(db);
        Ok(())
    }

    async fn close(&self) -> Result<(), RdbError> {
        // Dropping the handle releases sled's file locks; idempotent since
        // setting `None` on an already-`None` slot is a no-op.
        *self.db.write().await = None;
        Ok(())
    }

    async fn raw_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, RdbError> {
        let db = self.db().await?;
        let got = db
            .get(key)
            .map_err(|e| RdbError::backend_unavailable(e.to_string()).with_source(e))?;
        Ok(got.map(|ivec| ivec.to_vec()))
    }

    async fn raw_put(&self, key: &[u8], raw: &[u8]) -> Result<(), RdbError> {
        let db = self.db().await?;
        db.insert(key, raw)
            .map_err(|e| RdbError::backend_unavailable(e.to_string()).with_source(e))?;
        Ok(())
    }

    async fn raw_delete(&self, key: &[u8]) -> Result<(), RdbError> {
        let db = self.db().await?;
        // Deleting a missing key is not an error (`spec.md` §4.3).
        db.remove(key)
            .map_err(|e| RdbError::backend_unavailable(e.to_string()).with_source(e))?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<Vec<u8>>, RdbError> {
        let db = self.db().await?;
        db.iter()
            .keys()
            .map(|r| {
                r.map(|ivec| ivec.to_vec())
                    .map_err(|e| RdbError::backend_unavailable(e.to_string()).with_source(e))
            })
            .collect()
    }

    async fn stats(&self) -> Result<BTreeMap<String, serde_json::Value>, RdbError> {
        let db = self.db().await?;
        let mut out = BTreeMap::new();
        out.insert("len".to_string(), serde_json::json!(db.len()));
        out.insert(
            "size_on_disk".to_string(),
            serde_json::json!(
                db.size_on_disk()
                    .map_err(|e| RdbError::backend_unavailable(e.to_string()).with_source(e))?
            ),
        );
        out.insert(
            "store_path".to_string(),
            serde_json::json!(self.store_path().display().to_string()),
        );
        Ok(out)
    }
}

/// Check whether `basedir/shm-{shmkey}` already exists on disk, without
/// opening it. Used by callers that want to distinguish "attaching to an
/// existing store" from "creating a new one".
pub fn store_exists(basedir: &Path, shmkey: u64) -> bool {
    basedir.join(format!("shm-{shmkey}")).is_dir()
}
