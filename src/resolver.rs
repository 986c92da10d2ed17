//! # Import Resolver
//!
//! Maps an import path to the directory holding the package, together with
//! the filesystem it lives on and the module it belongs to.
//!
//! Lookup order for non-local paths:
//!
//! 1.  the main module, when the path starts with its module path;
//! 2.  the legacy `cue.mod/gen`, `cue.mod/pkg` and `cue.mod/usr`
//!     directories of the main module;
//! 3.  every dependency module whose path is a prefix of the import path,
//!     at the version selected by MVS.
//!
//! The build list is computed on first use and kept for the rest of the
//! load; fetched module locations are memoized per module version.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::cache::{Cache, DirCache, SyntaxCache};
use crate::config::{Completed, ModFile, LEGACY_PKG_DIRS, MOD_DIR};
use crate::error::{Error, Result};
use crate::filesystem::FileSystem;
use crate::module::{
    check_import_path, clean_import, is_local_import, is_std_path, split_path_version, ImportPath,
    ModuleVersion, SourceLoc,
};
use crate::mvs::{build_list, BuildList};
use crate::package::PackageSelector;
use crate::registry::{FetchContext, Registry};
use crate::syntax::{is_valid_ident, BasicParser};

/// Where a package lives.
#[derive(Debug, Clone)]
pub struct PackageLocation {
    /// Canonical import path, used as the memoization key of the load.
    pub import_path: String,
    pub dir: PathBuf,
    pub fs: Arc<dyn FileSystem>,
    /// Owning module path without major version suffix.
    pub module: Option<String>,
    pub root: Option<PathBuf>,
    pub selector: PackageSelector,
    pub local: bool,
}

/// Resolves import paths for one load.
pub struct Resolver {
    fs: Arc<dyn FileSystem>,
    /// Main module path with major suffix.
    module: Option<String>,
    module_root: Option<PathBuf>,
    mod_file: Option<ModFile>,
    registry: Option<Arc<dyn Registry>>,
    ctx: FetchContext,
    build_list: OnceLock<Result<BuildList>>,
    sources: Cache<ModuleVersion, Result<SourceLoc>>,
    syntax: SyntaxCache,
    dirs: DirCache,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("module", &self.module)
            .field("module_root", &self.module_root)
            .field("registry", &self.registry.is_some())
            .finish()
    }
}

fn base_module(module: &str) -> &str {
    split_path_version(module)
        .map(|(base, _)| base)
        .unwrap_or(module)
}

/// Import path of `dir` within a module rooted at `root`.
fn module_import_path(module: &str, root: &Path, dir: &Path) -> Option<String> {
    let rel = dir.strip_prefix(root).ok()?;
    let rel = rel.to_string_lossy().replace('\\', "/");
    if rel.is_empty() {
        Some(module.to_string())
    } else {
        Some(format!("{}/{}", module, rel))
    }
}

impl Resolver {
    pub fn new(completed: &Completed, registry: Option<Arc<dyn Registry>>, ctx: FetchContext) -> Self {
        Self {
            fs: completed.fs.clone(),
            module: completed.module.clone(),
            module_root: completed.module_root.clone(),
            mod_file: completed.mod_file.clone(),
            registry,
            ctx,
            build_list: OnceLock::new(),
            sources: Cache::new(),
            syntax: SyntaxCache::new(Arc::new(BasicParser)),
            dirs: DirCache::new(),
        }
    }

    /// Shares the directory listings of a load, so a directory checked while
    /// resolving is not listed again when its package is built.
    pub fn with_caches(mut self, syntax: SyntaxCache, dirs: DirCache) -> Self {
        self.syntax = syntax;
        self.dirs = dirs;
        self
    }

    fn has_cue_files(&self, fs: &dyn FileSystem, dir: &Path) -> bool {
        self.dirs.has_cue_files(fs, &self.syntax, dir)
    }

    /// The location of a directory of the main filesystem, as seen from the
    /// command line.
    pub fn main_location(&self, dir: &Path) -> PackageLocation {
        let module = self.module.as_deref().map(base_module);
        let import_path = match (module, &self.module_root) {
            (Some(module), Some(root)) => module_import_path(module, root, dir),
            _ => None,
        };
        let in_module = import_path.is_some();
        PackageLocation {
            import_path: import_path.unwrap_or_else(|| dir.to_string_lossy().into_owned()),
            dir: dir.to_path_buf(),
            fs: self.fs.clone(),
            module: if in_module { module.map(str::to_string) } else { None },
            root: if in_module { self.module_root.clone() } else { None },
            selector: PackageSelector::Unique,
            local: true,
        }
    }

    /// The MVS build list of the main module.
    pub fn build_list(&self) -> Result<&BuildList> {
        self.build_list
            .get_or_init(|| self.compute_build_list())
            .as_ref()
            .map_err(Clone::clone)
    }

    fn compute_build_list(&self) -> Result<BuildList> {
        let main = ModuleVersion::main(self.module.clone().unwrap_or_default());
        let direct = match &self.mod_file {
            Some(mf) => mf.dep_versions()?,
            None => Vec::new(),
        };
        if direct.is_empty() {
            return build_list(&main, &direct, &|_: &ModuleVersion| Ok(Vec::new()));
        }
        let registry = self.registry.as_ref().ok_or_else(|| Error::Registry {
            module: direct[0].to_string(),
            message: "no registry configured".to_string(),
        })?;
        build_list(&main, &direct, &|mv: &ModuleVersion| {
            registry.requirements(&self.ctx, mv)
        })
    }

    fn fetch(&self, mv: &ModuleVersion) -> Result<SourceLoc> {
        let registry = self.registry.as_ref().ok_or_else(|| Error::Registry {
            module: mv.to_string(),
            message: "no registry configured".to_string(),
        })?;
        self.sources
            .get_or_insert_with(mv.clone(), || registry.fetch(&self.ctx, mv))?
    }

    /// Resolves `raw` as imported from the package at `from`.
    pub fn resolve(&self, raw: &str, from: &PackageLocation) -> Result<PackageLocation> {
        if is_local_import(&ImportPath::parse(raw).path) {
            return self.resolve_local(raw, from);
        }
        if raw.starts_with('/') {
            return Err(Error::InvalidImportPath {
                path: raw.to_string(),
                message: "cannot import absolute path".to_string(),
            });
        }
        check_import_path(raw)?;
        let ip = ImportPath::parse(raw);
        let clean = clean_import(&ip.path);
        if clean != ip.path {
            return Err(Error::InvalidImportPath {
                path: raw.to_string(),
                message: format!("non-canonical import path: should be {:?}", clean),
            });
        }
        if ip.explicit_qualifier {
            if ip.qualifier == "_" || !is_valid_ident(&ip.qualifier) {
                return Err(Error::InvalidQualifier {
                    path: raw.to_string(),
                    message: format!("{:?} is not a valid package name", ip.qualifier),
                });
            }
        } else if !is_valid_ident(&ip.qualifier) {
            return Err(Error::InvalidQualifier {
                path: raw.to_string(),
                message: format!(
                    "implied package identifier {:?} is not valid; add an explicit qualifier",
                    ip.qualifier
                ),
            });
        }
        if is_std_path(&ip.path) {
            return Err(Error::StandardLibraryImport {
                path: raw.to_string(),
            });
        }

        let selector = PackageSelector::Named(ip.qualifier.clone());
        let import_path = ip.canonical();

        if let Some(loc) = self.in_main_module(&ip) {
            if self.has_cue_files(&*self.fs, &loc) {
                return Ok(PackageLocation {
                    import_path,
                    dir: loc,
                    fs: self.fs.clone(),
                    module: self.module.as_deref().map(base_module).map(str::to_string),
                    root: self.module_root.clone(),
                    selector,
                    local: false,
                });
            }
        }

        if let Some(root) = &self.module_root {
            for legacy in LEGACY_PKG_DIRS {
                let dir = root.join(MOD_DIR).join(legacy).join(&ip.path);
                if self.has_cue_files(&*self.fs, &dir) {
                    log::debug!("{} found in {}", raw, dir.display());
                    return Ok(PackageLocation {
                        import_path,
                        // Legacy packages stand alone: no ancestor files.
                        root: Some(dir.clone()),
                        dir,
                        fs: self.fs.clone(),
                        module: None,
                        selector,
                        local: false,
                    });
                }
            }
        }

        self.resolve_external(&ip, import_path, selector)
    }

    fn in_main_module(&self, ip: &ImportPath) -> Option<PathBuf> {
        let module = self.module.as_deref()?;
        let root = self.module_root.as_ref()?;
        let (base, major) = split_path_version(module).unwrap_or((module, ""));
        if !ip.version.is_empty() && ip.version != major {
            return None;
        }
        if ip.path == base {
            return Some(root.clone());
        }
        let rel = ip.path.strip_prefix(base)?.strip_prefix('/')?;
        Some(root.join(rel))
    }

    fn resolve_external(
        &self,
        ip: &ImportPath,
        import_path: String,
        selector: PackageSelector,
    ) -> Result<PackageLocation> {
        let defaults = self
            .mod_file
            .as_ref()
            .map(ModFile::default_major_versions)
            .unwrap_or_default();

        let mut prefixes: Vec<(&str, String)> = Vec::new();
        let mut prefix = ip.path.as_str();
        loop {
            let major = if ip.version.is_empty() {
                defaults.get(prefix).cloned()
            } else {
                Some(ip.version.clone())
            };
            if let Some(major) = major {
                prefixes.push((prefix, format!("{}@{}", prefix, major)));
            }
            match prefix.rfind('/') {
                Some(i) => prefix = &prefix[..i],
                None => break,
            }
        }

        let mut candidates: Vec<(ModuleVersion, SourceLoc, PathBuf)> = Vec::new();
        let mut any_module = self.in_main_module(ip).is_some();
        if !prefixes.is_empty() {
            let list = self.build_list()?;
            for (prefix, module_path) in prefixes {
                let mv = match list.selected(&module_path) {
                    Some(mv) if !mv.is_main() => mv.clone(),
                    _ => continue,
                };
                any_module = true;
                let loc = self.fetch(&mv)?;
                let rel = ip.path[prefix.len()..].trim_start_matches('/');
                let dir = if rel.is_empty() {
                    loc.dir.clone()
                } else {
                    loc.dir.join(rel)
                };
                if self.has_cue_files(&*loc.fs, &dir) {
                    candidates.push((mv, loc, dir));
                }
            }
        }

        match candidates.len() {
            0 if any_module => Err(Error::ImportNotFound { path: import_path }),
            0 => Err(Error::MissingDependency { path: import_path }),
            1 => {
                let (mv, loc, dir) = candidates.remove(0);
                log::debug!("{} resolved to {} in {}", import_path, dir.display(), mv);
                Ok(PackageLocation {
                    import_path,
                    dir,
                    fs: loc.fs,
                    module: Some(mv.base_path().to_string()),
                    root: Some(loc.dir),
                    selector,
                    local: false,
                })
            }
            _ => Err(Error::AmbiguousImport {
                path: import_path,
                locations: candidates
                    .iter()
                    .map(|(mv, _, dir)| format!("{} ({})", mv, dir.display()))
                    .collect(),
            }),
        }
    }

    fn resolve_local(&self, raw: &str, from: &PackageLocation) -> Result<PackageLocation> {
        let ip = ImportPath::parse(raw);
        let dir = crate::filesystem::clean_path(&from.dir.join(&ip.path));
        let selector = if ip.explicit_qualifier {
            PackageSelector::parse(&ip.qualifier)
        } else {
            PackageSelector::Unique
        };

        let in_module = match (&from.module, &from.root) {
            (Some(module), Some(root)) => module_import_path(module, root, &dir),
            _ => None,
        };
        let import_path = match in_module {
            Some(path) => {
                let mut resolved = ImportPath::parse(&path);
                if ip.explicit_qualifier {
                    resolved.qualifier = ip.qualifier.clone();
                }
                resolved.canonical()
            }
            None if ip.explicit_qualifier => {
                format!("{}:{}", dir.to_string_lossy(), ip.qualifier)
            }
            None => dir.to_string_lossy().into_owned(),
        };
        let inside = from.root.as_ref().is_some_and(|root| dir.starts_with(root));
        Ok(PackageLocation {
            import_path,
            dir,
            fs: from.fs.clone(),
            module: if inside { from.module.clone() } else { None },
            root: if inside { from.root.clone() } else { None },
            selector,
            local: true,
        })
    }
}
