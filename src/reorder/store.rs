//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zicube.
//! The Zicube project belongs to the Dunimd Team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! # Addressable Stores
//!
//! Records are addressed by their own value map: two keys are the same
//! record iff they hold the same component ids with the same values. The
//! namespace a record belongs to travels inside the key under
//! [`NAMESPACE_FIELD`]; backends partition on it and drop a whole partition
//! on [`AddressableStore::release`].
//!
//! - [`MemoryStore`]: one hash map per namespace.
//! - [`FileStore`]: one directory per namespace and one JSON file per record,
//!   named by the BLAKE3 digest of the canonical key.
//! - [`ScopedStore`]: binds a store to one namespace and releases it when
//!   dropped.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::errors::{CubeError, Result};

/// Ordered component id to value mapping used for both keys and values.
pub type ValueMap = BTreeMap<String, String>;

/// Key field carrying the namespace a record belongs to.
pub const NAMESPACE_FIELD: &str = "@ns";

pub trait AddressableStore {
    /// Inserts or replaces the record stored under `key`.
    fn put(&mut self, key: &ValueMap, value: ValueMap) -> Result<()>;

    fn get(&self, key: &ValueMap) -> Result<Option<ValueMap>>;

    /// Drops every record of the namespace. Releasing an unknown namespace
    /// is not an error.
    fn release(&mut self, namespace: &str) -> Result<()>;
}

impl<S: AddressableStore + ?Sized> AddressableStore for Box<S> {
    fn put(&mut self, key: &ValueMap, value: ValueMap) -> Result<()> {
        (**self).put(key, value)
    }
    fn get(&self, key: &ValueMap) -> Result<Option<ValueMap>> {
        (**self).get(key)
    }
    fn release(&mut self, namespace: &str) -> Result<()> {
        (**self).release(namespace)
    }
}

/// Splits a key into its namespace and the remaining fields.
fn split_namespace(key: &ValueMap) -> (String, ValueMap) {
    let mut rest = key.clone();
    let namespace = rest.remove(NAMESPACE_FIELD).unwrap_or_default();
    (namespace, rest)
}

static NEXT_CONVERSION: AtomicU64 = AtomicU64::new(0);

/// Returns a namespace unique to this process and call, e.g.
/// `zicube-3-1f0c9a2be4d7`.
pub fn conversion_namespace(prefix: &str) -> String {
    let seq = NEXT_CONVERSION.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let digest = blake3::hash(format!("{}:{}:{}", std::process::id(), seq, nanos).as_bytes());
    let hex = digest.to_hex();
    format!("{}-{}-{}", prefix, seq, &hex.as_str()[..12])
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: HashMap<String, HashMap<ValueMap, ValueMap>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held for the namespace.
    pub fn len(&self, namespace: &str) -> usize {
        self.namespaces.get(namespace).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.values().all(HashMap::is_empty)
    }

    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.keys().cloned().collect();
        names.sort();
        names
    }
}

impl AddressableStore for MemoryStore {
    fn put(&mut self, key: &ValueMap, value: ValueMap) -> Result<()> {
        let (namespace, key) = split_namespace(key);
        self.namespaces
            .entry(namespace)
            .or_default()
            .insert(key, value);
        Ok(())
    }

    fn get(&self, key: &ValueMap) -> Result<Option<ValueMap>> {
        let (namespace, key) = split_namespace(key);
        Ok(self
            .namespaces
            .get(&namespace)
            .and_then(|records| records.get(&key))
            .cloned())
    }

    fn release(&mut self, namespace: &str) -> Result<()> {
        if let Some(records) = self.namespaces.remove(namespace) {
            log::debug!("released {} records of namespace {}", records.len(), namespace);
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    key: ValueMap,
    value: ValueMap,
}

/// File-backed store. Digest collisions are resolved by probing numbered
/// file names until the stored key matches or a free slot is found.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    _temp: Option<tempfile::TempDir>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, _temp: None })
    }

    /// A store rooted in a fresh temporary directory, removed on drop.
    pub fn temporary() -> Result<Self> {
        let temp = tempfile::Builder::new().prefix("zicube-store-").tempdir()?;
        Ok(Self {
            root: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        let digest = blake3::hash(namespace.as_bytes());
        let hex = digest.to_hex();
        self.root.join(&hex.as_str()[..32])
    }

    fn record_path(dir: &Path, digest: &str, probe: usize) -> PathBuf {
        dir.join(format!("{}-{}.json", digest, probe))
    }

    fn read_record(path: &Path) -> Result<StoredRecord> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Finds the slot holding `key`, or the first free slot after it.
    fn locate(&self, dir: &Path, key: &ValueMap) -> Result<(PathBuf, bool)> {
        let canonical = serde_json::to_string(key)?;
        let digest = blake3::hash(canonical.as_bytes());
        let hex = digest.to_hex();
        let mut probe = 0;
        loop {
            let path = Self::record_path(dir, hex.as_str(), probe);
            if !path.exists() {
                return Ok((path, false));
            }
            if &Self::read_record(&path)?.key == key {
                return Ok((path, true));
            }
            log::debug!("digest collision at {}", path.display());
            probe += 1;
        }
    }
}

impl AddressableStore for FileStore {
    fn put(&mut self, key: &ValueMap, value: ValueMap) -> Result<()> {
        let (namespace, key) = split_namespace(key);
        let dir = self.namespace_dir(&namespace);
        fs::create_dir_all(&dir)?;
        let (path, _) = self.locate(&dir, &key)?;
        let record = StoredRecord { key, value };
        fs::write(&path, serde_json::to_vec(&record)?)?;
        Ok(())
    }

    fn get(&self, key: &ValueMap) -> Result<Option<ValueMap>> {
        let (namespace, key) = split_namespace(key);
        let dir = self.namespace_dir(&namespace);
        if !dir.exists() {
            return Ok(None);
        }
        match self.locate(&dir, &key)? {
            (path, true) => Ok(Some(Self::read_record(&path)?.value)),
            (_, false) => Ok(None),
        }
    }

    fn release(&mut self, namespace: &str) -> Result<()> {
        let dir = self.namespace_dir(namespace);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .map_err(|e| CubeError::store(format!("cannot remove {}: {}", dir.display(), e)))?;
            log::debug!("released namespace {} at {}", namespace, dir.display());
        }
        Ok(())
    }
}

/// A store bound to one namespace. The namespace is released exactly once,
/// explicitly or on drop.
pub struct ScopedStore<'a, S: AddressableStore + ?Sized> {
    store: &'a mut S,
    namespace: String,
    released: bool,
}

impl<'a, S: AddressableStore + ?Sized> ScopedStore<'a, S> {
    pub fn new(store: &'a mut S, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            released: false,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn scoped(&self, key: &ValueMap) -> ValueMap {
        let mut key = key.clone();
        key.insert(NAMESPACE_FIELD.to_string(), self.namespace.clone());
        key
    }

    pub fn put(&mut self, key: &ValueMap, value: ValueMap) -> Result<()> {
        if self.released {
            return Err(CubeError::store(format!("namespace {} already released", self.namespace)));
        }
        let key = self.scoped(key);
        self.store.put(&key, value)
    }

    pub fn get(&self, key: &ValueMap) -> Result<Option<ValueMap>> {
        if self.released {
            return Err(CubeError::store(format!("namespace {} already released", self.namespace)));
        }
        self.store.get(&self.scoped(key))
    }

    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.store.release(&self.namespace)
    }
}

impl<'a, S: AddressableStore + ?Sized> Drop for ScopedStore<'a, S> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("failed to release store namespace {}: {}", self.namespace, e);
        }
    }
}
