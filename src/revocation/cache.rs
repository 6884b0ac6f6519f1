//
// Copyright 2026 The Notation Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Caches of fetched CRLs and OCSP responses.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use sha2::{Digest, Sha256};

use crate::errors::IoError;

/// A CRL or OCSP response, as fetched from `url`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub url: String,
    #[serde_as(as = "Base64")]
    pub bundle: Vec<u8>,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Entries without `nextUpdate` are never fresh.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.next_update {
            Some(next_update) => now > next_update,
            None => true,
        }
    }
}

/// The key an entry is stored under: the hex SHA-256 of its URL.
pub fn cache_key(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

/// Storage of revocation data keyed by URL. Failures are never fatal: a
/// cache that cannot read reports a miss, one that cannot write drops the
/// entry.
pub trait Cache: Send + Sync {
    fn get(&self, url: &str) -> Option<CacheEntry>;
    fn set(&self, entry: CacheEntry);
}

/// Cache rooted in a directory, one file per entry.
pub struct FileCache {
    root: PathBuf,
    warned: AtomicBool,
}

impl FileCache {
    /// Open the cache, creating `root` when needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, IoError> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| IoError::from_io(&e, &format!("revocation cache {}", root.display())))?;
        Ok(FileCache {
            root,
            warned: AtomicBool::new(false),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, url: &str) -> PathBuf {
        self.root.join(cache_key(url))
    }

    fn discard(&self, url: &str, reason: String) {
        if self.warned.swap(true, Ordering::Relaxed) {
            tracing::debug!(url, reason, "revocation cache error discarded");
        } else {
            tracing::warn!(
                url,
                reason,
                "revocation cache error discarded, further cache errors are only logged at debug level"
            );
        }
    }

    fn write(&self, entry: &CacheEntry) -> Result<(), String> {
        let content = serde_json::to_vec(entry).map_err(|e| e.to_string())?;
        // the temporary file is removed on drop unless persisted
        let mut file = tempfile::NamedTempFile::new_in(&self.root).map_err(|e| e.to_string())?;
        file.write_all(&content).map_err(|e| e.to_string())?;
        file.as_file().sync_all().map_err(|e| e.to_string())?;
        file.persist(self.path(&entry.url))
            .map_err(|e| e.error.to_string())?;
        Ok(())
    }
}

impl Cache for FileCache {
    fn get(&self, url: &str) -> Option<CacheEntry> {
        let path = self.path(url);
        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(url, "revocation cache miss");
                return None;
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "cannot read revocation cache entry");
                return None;
            }
        };
        match serde_json::from_slice::<CacheEntry>(&content) {
            Ok(entry) if entry.url == url => Some(entry),
            Ok(_) => {
                tracing::debug!(url, "revocation cache entry belongs to another URL");
                None
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "malformed revocation cache entry");
                None
            }
        }
    }

    fn set(&self, entry: CacheEntry) {
        if let Err(reason) = self.write(&entry) {
            self.discard(&entry.url, reason);
        }
    }
}

/// Cache living as long as the process.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for MemoryCache {
    fn get(&self, url: &str) -> Option<CacheEntry> {
        let entries = self.entries.lock().ok()?;
        let entry = entries.get(url).cloned();
        if entry.is_none() {
            tracing::debug!(url, "revocation cache miss");
        }
        entry
    }

    fn set(&self, entry: CacheEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            let now = Utc::now();
            entries.retain(|_, e| !e.is_expired(now));
            entries.insert(entry.url.clone(), entry);
        }
    }
}

/// The cache rooted at `root`, falling back to memory when there is no root
/// or the directory cannot be created.
pub fn open_cache(root: Option<&Path>) -> Arc<dyn Cache> {
    match root {
        None => Arc::new(MemoryCache::new()),
        Some(root) => match FileCache::new(root) {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "cannot create the revocation cache directory, caching in memory"
                );
                Arc::new(MemoryCache::new())
            }
        },
    }
}
