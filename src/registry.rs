//! # Module Registries
//!
//! A registry provides two things for a module version: its source files
//! and its direct requirements. Module resolution only ever talks to the
//! [`Registry`] trait, so the backing store can be swapped out:
//!
//! - **`DirRegistry`**: a module cache directory on disk, one directory per
//!   module version (`<root>/<module-path>@<version>/`), each with its own
//!   `cue.mod/module.toml`.
//! - **`MemoryRegistry`**: modules held in memory, for embedding and tests.
//!
//! Every call receives a [`FetchContext`] carrying an optional deadline and
//! a cancellation flag; a cancelled or expired context yields
//! [`Error::Cancelled`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use walkdir::WalkDir;

use crate::config::{parse_manifest, qualify_module, MANIFEST_FILE, MOD_DIR};
use crate::error::{Error, Result};
use crate::filesystem::{FileSystem, HostFs, MemoryFS};
use crate::module::{major, ModuleVersion, SourceLoc};

/// Deadline and cancellation for registry calls.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl FetchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancels this context and every clone of it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_done(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fails with [`Error::Cancelled`] once the context is done.
    pub fn check(&self, module: &str) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(Error::Cancelled {
                module: module.to_string(),
                reason: "context cancelled".to_string(),
            });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::Cancelled {
                module: module.to_string(),
                reason: "deadline exceeded".to_string(),
            });
        }
        Ok(())
    }
}

/// Source of module contents and requirements.
pub trait Registry: Send + Sync {
    /// Returns where the files of `mv` live.
    fn fetch(&self, ctx: &FetchContext, mv: &ModuleVersion) -> Result<SourceLoc>;

    /// Returns the direct requirements declared by `mv`'s manifest.
    fn requirements(&self, ctx: &FetchContext, mv: &ModuleVersion) -> Result<Vec<ModuleVersion>>;
}

/// Reads a module's manifest and returns its requirements, checking that
/// the manifest declares the module it was fetched as.
fn manifest_requirements(
    fs: &dyn FileSystem,
    root: &Path,
    mv: &ModuleVersion,
) -> Result<Vec<ModuleVersion>> {
    let path = root.join(MOD_DIR).join(MANIFEST_FILE);
    let data = fs.read_file(&path).map_err(|e| Error::Registry {
        module: mv.to_string(),
        message: format!("cannot read module file: {}", e),
    })?;
    let mf = parse_manifest(&String::from_utf8_lossy(&data), &path)?;
    let found = mf.qualified_module();
    if found != qualify_module(&mv.path) {
        return Err(Error::InconsistentModule {
            found: mf.module.clone(),
            want: mv.path.clone(),
        });
    }
    mf.dep_versions()
}

/// Modules held in memory.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    modules: HashMap<ModuleVersion, Arc<MemoryFS>>,
    requirement_calls: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module version; `files` must include the module's
    /// `cue.mod/module.toml`.
    pub fn add_module(&mut self, mv: ModuleVersion, files: MemoryFS) {
        self.modules.insert(mv, Arc::new(files));
    }

    /// Convenience wrapper around [`MemoryRegistry::add_module`] taking
    /// `(path, content)` pairs.
    pub fn add_files(&mut self, path: &str, version: &str, files: &[(&str, &str)]) -> Result<()> {
        let mv = ModuleVersion::new(path, version)?;
        let mut fs = MemoryFS::new();
        for (name, content) in files {
            fs.add_file_string(name, content)?;
        }
        self.add_module(mv, fs);
        Ok(())
    }

    /// Number of `requirements` calls served so far.
    pub fn requirement_calls(&self) -> usize {
        self.requirement_calls.load(Ordering::SeqCst)
    }

    fn get(&self, mv: &ModuleVersion) -> Result<&Arc<MemoryFS>> {
        self.modules.get(mv).ok_or_else(|| Error::Registry {
            module: mv.to_string(),
            message: "module not found".to_string(),
        })
    }
}

impl Registry for MemoryRegistry {
    fn fetch(&self, ctx: &FetchContext, mv: &ModuleVersion) -> Result<SourceLoc> {
        ctx.check(&mv.to_string())?;
        let fs = self.get(mv)?;
        Ok(SourceLoc {
            fs: fs.clone(),
            dir: PathBuf::from("/"),
        })
    }

    fn requirements(&self, ctx: &FetchContext, mv: &ModuleVersion) -> Result<Vec<ModuleVersion>> {
        self.requirement_calls.fetch_add(1, Ordering::SeqCst);
        ctx.check(&mv.to_string())?;
        let fs = self.get(mv)?;
        manifest_requirements(&**fs, Path::new("/"), mv)
    }
}

/// A module cache directory on disk.
#[derive(Debug, Clone)]
pub struct DirRegistry {
    root: PathBuf,
    fs: Arc<HostFs>,
}

impl DirRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            fs: Arc::new(HostFs),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding `mv`.
    pub fn module_dir(&self, mv: &ModuleVersion) -> PathBuf {
        self.root.join(mv.to_string())
    }

    /// Every module version present in the cache directory, sorted.
    pub fn index(&self) -> Result<Vec<ModuleVersion>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        let mut walker = WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| e.file_type().is_dir() && e.file_name() != MOD_DIR);
        while let Some(entry) = walker.next() {
            let entry = entry.map_err(|e| Error::Io {
                path: self.root.clone(),
                message: e.to_string(),
            })?;
            let name = entry.file_name().to_string_lossy();
            let (base_name, version) = match name.rsplit_once('@') {
                Some(parts) => parts,
                None => continue,
            };
            // Module directories are leaves of the index.
            walker.skip_current_dir();
            let rel = match entry.path().parent().and_then(|p| p.strip_prefix(&self.root).ok()) {
                Some(rel) => rel.join(base_name),
                None => continue,
            };
            let base = rel.to_string_lossy().replace('\\', "/");
            let path = format!("{}@{}", base, major(version));
            match ModuleVersion::new(path, version) {
                Ok(mv) => found.push(mv),
                Err(e) => log::warn!("skipping {}: {}", entry.path().display(), e),
            }
        }
        found.sort();
        Ok(found)
    }
}

impl Registry for DirRegistry {
    fn fetch(&self, ctx: &FetchContext, mv: &ModuleVersion) -> Result<SourceLoc> {
        ctx.check(&mv.to_string())?;
        let dir = self.module_dir(mv);
        if !dir.is_dir() {
            return Err(Error::Registry {
                module: mv.to_string(),
                message: format!("not found in {}", self.root.display()),
            });
        }
        log::debug!("fetched {} from {}", mv, dir.display());
        Ok(SourceLoc {
            fs: self.fs.clone(),
            dir,
        })
    }

    fn requirements(&self, ctx: &FetchContext, mv: &ModuleVersion) -> Result<Vec<ModuleVersion>> {
        ctx.check(&mv.to_string())?;
        manifest_requirements(&*self.fs, &self.module_dir(mv), mv)
    }
}
