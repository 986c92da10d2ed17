//! Per-load caches
//!
//! The generic [`Cache`] holds its map behind `Arc<Mutex<..>>`. The lock is
//! only held to consult or insert; computing a missing value happens outside
//! of it, so two racing callers may both compute and the first insert wins.

use std::collections::HashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::filesystem::FileSystem;
use crate::filetypes::Encoding;
use crate::scanner::{scan_dir, DirScan};
use crate::syntax::{ParseMode, SourceParser, SyntaxFile};

/// Thread-safe memoization map
#[derive(Debug)]
pub struct Cache<K, V> {
    entries: Arc<Mutex<HashMap<K, V>>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K, V> Default for Cache<K, V> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<K, V>>> {
        self.entries.lock().map_err(|_| Error::LockPoisoned {
            context: "cache".to_string(),
        })
    }

    /// Get a cached value, or compute and cache it if not present
    pub fn get_or_insert_with<F>(&self, key: K, compute: F) -> Result<V>
    where
        F: FnOnce() -> V,
    {
        if let Some(cached) = self.lock()?.get(&key) {
            return Ok(cached.clone());
        }

        let value = compute();

        let mut entries = self.lock()?;
        Ok(entries.entry(key).or_insert(value).clone())
    }

    /// Get a value from cache without computing
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.lock()?.get(key).cloned())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }
}

/// Identity of a filesystem instance, used to keep trees from different
/// filesystems apart.
pub fn fs_id(fs: &dyn FileSystem) -> usize {
    fs as *const dyn FileSystem as *const () as usize
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SyntaxKey {
    fs: usize,
    path: PathBuf,
    mode: ParseMode,
}

/// Parsed syntax trees keyed by filesystem, canonical path and parse mode.
///
/// Parse failures are cached as well, so a broken file is reported once per
/// load no matter how many units include it.
#[derive(Clone)]
pub struct SyntaxCache {
    parser: Arc<dyn SourceParser>,
    entries: Cache<SyntaxKey, Result<Arc<SyntaxFile>>>,
}

impl std::fmt::Debug for SyntaxCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntaxCache")
            .field("entries", &self.entries.len().unwrap_or(0))
            .finish()
    }
}

impl SyntaxCache {
    pub fn new(parser: Arc<dyn SourceParser>) -> Self {
        Self {
            parser,
            entries: Cache::new(),
        }
    }

    /// Returns the tree for `path`, parsing it at most once per mode.
    ///
    /// A pre-parsed tree offered by the filesystem is returned as-is, and an
    /// imports-only request is served from an existing full parse.
    pub fn parse(
        &self,
        fs: &dyn FileSystem,
        path: &Path,
        mode: ParseMode,
    ) -> Result<Arc<SyntaxFile>> {
        if let Some(tree) = fs.syntax(path) {
            return Ok(tree);
        }
        let id = fs_id(fs);
        if mode == ParseMode::ImportsOnly {
            let full = SyntaxKey {
                fs: id,
                path: path.to_path_buf(),
                mode: ParseMode::Full,
            };
            if let Some(Ok(tree)) = self.entries.get(&full)? {
                return Ok(tree);
            }
        }
        let key = SyntaxKey {
            fs: id,
            path: path.to_path_buf(),
            mode,
        };
        self.entries.get_or_insert_with(key, || {
            log::trace!("parsing {} ({:?})", path.display(), mode);
            let src = fs.read_file(path)?;
            self.parser.parse(path, &src, mode).map(Arc::new)
        })?
    }

    pub fn len(&self) -> usize {
        self.entries.len().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Directory scans keyed by filesystem and canonical directory.
#[derive(Debug, Clone, Default)]
pub struct DirCache {
    entries: Cache<(usize, PathBuf), Result<Arc<DirScan>>>,
}

impl DirCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the scan of `dir`, listing it on first use.
    pub fn scan(
        &self,
        fs: &dyn FileSystem,
        syntax: &SyntaxCache,
        dir: &Path,
    ) -> Result<Arc<DirScan>> {
        let key = (fs_id(fs), dir.to_path_buf());
        self.entries
            .get_or_insert_with(key, || scan_dir(fs, syntax, dir).map(Arc::new))?
    }

    /// Reports whether `dir` directly holds a `.cue` file; the listing is
    /// kept for the package builder.
    pub fn has_cue_files(&self, fs: &dyn FileSystem, syntax: &SyntaxCache, dir: &Path) -> bool {
        self.scan(fs, syntax, dir)
            .map(|scan| scan.files.iter().any(|f| f.encoding == Encoding::Cue))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
