// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Versioned object storage — immutable byte blobs addressed by key and
// storage-assigned version id.
//
// Every `put` creates a new version; existing versions are never overwritten.
// Version ids are decimal counters, zero-padded to 20 digits, increasing per
// key.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, instrument};
use vellum_core::error::{Result, VellumError};
use vellum_core::types::VersionId;

const OBJECT_EXT: &str = "obj";

/// Backend holding document bytes.
pub trait ObjectStore: Send + Sync {
    /// Stream the bytes of `version`, or of the latest version when `None`.
    ///
    /// A missing key or version is `ContentNotFound`.
    fn get(&self, key: &str, version: Option<&VersionId>) -> Result<Box<dyn Read + Send>>;

    /// Store `bytes` as a new version of `key` and return its id.
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<VersionId>;

    /// Remove one version, or every version of `key` when `None`.
    fn delete(&self, key: &str, version: Option<&VersionId>) -> Result<()>;
}

fn format_version(n: u64) -> VersionId {
    VersionId::new(format!("{n:020}"))
}

fn parse_version(key: &str, version: &VersionId) -> Result<u64> {
    version
        .as_str()
        .parse()
        .map_err(|_| VellumError::content_not_found(key, Some(version.as_str())))
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> VellumError {
    VellumError::Database("object store lock poisoned".into())
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Versions {
    /// Last assigned counter. Never reused, even after deletes.
    last: u64,
    blobs: BTreeMap<u64, Arc<Vec<u8>>>,
}

/// Process-local store for tests and ephemeral use.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Versions>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> Result<MutexGuard<'_, HashMap<String, Versions>>> {
        self.objects.lock().map_err(poisoned)
    }

    /// Overwrite a stored version in place to simulate storage corruption.
    #[cfg(any(test, feature = "test-util"))]
    pub fn tamper(&self, key: &str, version: &VersionId, bytes: &[u8]) -> Result<()> {
        let n = parse_version(key, version)?;
        let mut objects = self.objects()?;
        let slot = objects
            .get_mut(key)
            .and_then(|v| v.blobs.get_mut(&n))
            .ok_or_else(|| VellumError::content_not_found(key, Some(version.as_str())))?;
        *slot = Arc::new(bytes.to_vec());
        Ok(())
    }
}

/// Reader over a shared blob without copying it.
struct SharedBlob(Cursor<Arc<Vec<u8>>>);

impl Read for SharedBlob {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let pos = self.0.position() as usize;
        let data = self.0.get_ref();
        let remaining = data.get(pos..).unwrap_or(&[]);
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.0.set_position((pos + n) as u64);
        Ok(n)
    }
}

impl ObjectStore for MemoryObjectStore {
    fn get(&self, key: &str, version: Option<&VersionId>) -> Result<Box<dyn Read + Send>> {
        let objects = self.objects()?;
        let missing = || VellumError::content_not_found(key, version.map(VersionId::as_str));
        let versions = objects.get(key).ok_or_else(missing)?;
        let blob = match version {
            Some(v) => versions.blobs.get(&parse_version(key, v)?),
            None => versions.blobs.values().next_back(),
        }
        .ok_or_else(missing)?;
        Ok(Box::new(SharedBlob(Cursor::new(Arc::clone(blob)))))
    }

    fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<VersionId> {
        let mut objects = self.objects()?;
        let versions = objects.entry(key.to_string()).or_default();
        versions.last += 1;
        versions.blobs.insert(versions.last, Arc::new(bytes.to_vec()));
        Ok(format_version(versions.last))
    }

    fn delete(&self, key: &str, version: Option<&VersionId>) -> Result<()> {
        let mut objects = self.objects()?;
        let missing = || VellumError::content_not_found(key, version.map(VersionId::as_str));
        let versions = objects.get_mut(key).ok_or_else(missing)?;
        match version {
            Some(v) => {
                versions.blobs.remove(&parse_version(key, v)?).ok_or_else(missing)?;
            }
            None if versions.blobs.is_empty() => return Err(missing()),
            None => versions.blobs.clear(),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Filesystem store
// ---------------------------------------------------------------------------

/// Stores each version as `<root>/<hex(key)>/<version>.obj`.
///
/// Writes go to a temporary file in the same directory and are renamed into
/// place, so readers never observe a partial object.
pub struct FsObjectStore {
    root: PathBuf,
    /// Serialises version assignment within this process.
    put_lock: Mutex<()>,
}

impl FsObjectStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "filesystem object store opened");
        Ok(Self {
            root,
            put_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_dir(&self, key: &str) -> PathBuf {
        self.root.join(hex::encode(key.as_bytes()))
    }

    fn object_path(&self, key: &str, n: u64) -> PathBuf {
        self.key_dir(key).join(format!("{n:020}.{OBJECT_EXT}"))
    }

    /// Version counters present for `key`, ascending.
    fn list_versions(&self, key: &str) -> Result<Vec<u64>> {
        let dir = self.key_dir(key);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(OBJECT_EXT) {
                continue;
            }
            if let Some(n) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                versions.push(n);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    /// Highest counter ever assigned for `key`, including deleted versions.
    fn high_water(&self, key: &str) -> Result<u64> {
        let marker = self.key_dir(key).join("last");
        match fs::read_to_string(&marker) {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                VellumError::Database(format!(
                    "corrupt version marker {}: {:?}",
                    marker.display(),
                    raw.trim()
                ))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    fn resolve(&self, key: &str, version: Option<&VersionId>) -> Result<u64> {
        let missing = || VellumError::content_not_found(key, version.map(VersionId::as_str));
        match version {
            Some(v) => {
                let n = parse_version(key, v)?;
                if self.object_path(key, n).is_file() {
                    Ok(n)
                } else {
                    Err(missing())
                }
            }
            None => self.list_versions(key)?.last().copied().ok_or_else(missing),
        }
    }
}

impl ObjectStore for FsObjectStore {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    fn get(&self, key: &str, version: Option<&VersionId>) -> Result<Box<dyn Read + Send>> {
        let n = self.resolve(key, version)?;
        match fs::File::open(self.object_path(key, n)) {
            Ok(file) => Ok(Box::new(file)),
            // Deleted between resolve and open.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(
                VellumError::content_not_found(key, version.map(VersionId::as_str)),
            ),
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self, bytes), fields(bytes_len = bytes.len()))]
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<VersionId> {
        let _guard = self.put_lock.lock().map_err(poisoned)?;
        let dir = self.key_dir(key);
        fs::create_dir_all(&dir)?;

        let listed = self.list_versions(key)?.last().copied().unwrap_or(0);
        let n = listed.max(self.high_water(key)?) + 1;

        let tmp = dir.join(format!(".{n:020}.tmp"));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, self.object_path(key, n))?;
        fs::write(dir.join("last"), n.to_string())?;

        debug!(version = n, "object written");
        Ok(format_version(n))
    }

    fn delete(&self, key: &str, version: Option<&VersionId>) -> Result<()> {
        match version {
            Some(_) => {
                let n = self.resolve(key, version)?;
                fs::remove_file(self.object_path(key, n))?;
            }
            None => {
                let versions = self.list_versions(key)?;
                if versions.is_empty() {
                    return Err(VellumError::content_not_found(key, None));
                }
                for n in versions {
                    fs::remove_file(self.object_path(key, n))?;
                }
            }
        }
        Ok(())
    }
}
