//! # Load Configuration and Module Manifest
//!
//! This module defines the two configuration surfaces of the loader:
//!
//! - **`ModFile`**: the module manifest stored at `cue.mod/module.toml`,
//!   parsed with `serde` and `toml`. It names the module and lists its direct
//!   dependencies:
//!
//!   ```toml
//!   module = "example.com/app@v0"
//!
//!   [language]
//!   version = "v0.9.0"
//!
//!   [deps."example.com/lib@v0"]
//!   v = "v0.2.1"
//!   default = true
//!   ```
//!
//! - **`Config`**: the options of a single load (working directory, package
//!   selection, tags, overlay, registry, parser). [`Config::complete`]
//!   canonicalizes it: the working directory becomes absolute, the module
//!   root is located and the manifest parsed and checked for consistency.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::filesystem::{absolute, FileSystem, HostFs};
use crate::module::{split_path_version, ModuleVersion};
use crate::overlay::{OverlayFs, OverlaySource};
use crate::registry::{FetchContext, Registry};
use crate::syntax::SourceParser;
use crate::tags::TagVar;

/// Directory holding module metadata
pub const MOD_DIR: &str = "cue.mod";
/// Manifest file name inside [`MOD_DIR`]
pub const MANIFEST_FILE: &str = "module.toml";
/// Legacy package directories inside [`MOD_DIR`], in lookup order
pub const LEGACY_PKG_DIRS: [&str; 3] = ["gen", "pkg", "usr"];

/// Module manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModFile {
    /// Module path, optionally with a major version suffix.
    #[serde(default)]
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    /// Direct dependencies keyed by module path with major suffix.
    #[serde(default)]
    pub deps: BTreeMap<String, Dep>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Language {
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dep {
    /// Required version.
    pub v: String,
    /// Marks this major version as the one used for imports that do not
    /// name a major version.
    #[serde(default)]
    pub default: bool,
}

impl ModFile {
    /// Module path with a major version suffix; `@v0` is assumed when the
    /// manifest does not name one.
    pub fn qualified_module(&self) -> String {
        qualify_module(&self.module)
    }

    /// The direct requirements.
    pub fn dep_versions(&self) -> Result<Vec<ModuleVersion>> {
        self.deps
            .iter()
            .map(|(path, dep)| ModuleVersion::new(path.clone(), dep.v.clone()))
            .collect()
    }

    /// Base module path → major version used for unversioned imports.
    ///
    /// A major is the default when it is marked `default`, or when it is the
    /// only major of its base path.
    pub fn default_major_versions(&self) -> HashMap<String, String> {
        let mut majors: HashMap<&str, Vec<(&str, bool)>> = HashMap::new();
        for (path, dep) in &self.deps {
            if let Some((base, major)) = split_path_version(path) {
                majors.entry(base).or_default().push((major, dep.default));
            }
        }
        majors
            .into_iter()
            .filter_map(|(base, list)| {
                let chosen = match list.iter().find(|(_, default)| *default) {
                    Some((major, _)) => Some(*major),
                    None if list.len() == 1 => Some(list[0].0),
                    None => None,
                };
                chosen.map(|major| (base.to_string(), major.to_string()))
            })
            .collect()
    }
}

/// Appends `@v0` to a module path without a major version.
pub fn qualify_module(module: &str) -> String {
    if module.is_empty() || split_path_version(module).is_some() {
        module.to_string()
    } else {
        format!("{}@v0", module)
    }
}

/// Parses and validates a manifest.
pub fn parse_manifest(content: &str, path: &Path) -> Result<ModFile> {
    let manifest_err = |message: String| Error::Manifest {
        path: path.to_path_buf(),
        message,
    };
    let mf: ModFile = toml::from_str(content).map_err(|e| manifest_err(e.to_string()))?;

    if !mf.module.is_empty() {
        crate::module::check_import_path(&mf.module)
            .map_err(|e| manifest_err(e.to_string()))?;
    }
    let mut defaults: HashMap<&str, &str> = HashMap::new();
    for (dep_path, dep) in &mf.deps {
        let (base, _) = split_path_version(dep_path).ok_or_else(|| {
            manifest_err(format!("dependency {:?} has no major version suffix", dep_path))
        })?;
        ModuleVersion::new(dep_path.clone(), dep.v.clone())
            .map_err(|e| manifest_err(format!("dependency {}: {}", dep_path, e)))?;
        if dep.default {
            if let Some(other) = defaults.insert(base, dep_path) {
                return Err(manifest_err(format!(
                    "multiple default major versions for {}: {} and {}",
                    base, other, dep_path
                )));
            }
        }
    }
    Ok(mf)
}

/// Options for a single load.
#[derive(Clone, Default)]
pub struct Config {
    /// Working directory; the process working directory when unset.
    pub dir: Option<PathBuf>,
    /// Module root; located from `dir` when unset.
    pub module_root: Option<PathBuf>,
    /// Expected module path; checked against the manifest.
    pub module: Option<String>,
    /// Package selection: `""` infers it, `"_"` selects anonymous files,
    /// `"*"` loads every package, anything else names one.
    pub package: String,
    /// `-t` values: `key=value` or boolean tag names.
    pub tags: Vec<String>,
    /// Tag variable providers; the defaults when unset.
    pub tag_vars: Option<HashMap<String, TagVar>>,
    pub tests: bool,
    pub tools: bool,
    pub data_files: bool,
    /// Ignore build constraints.
    pub all_cue_files: bool,
    pub overlay: HashMap<PathBuf, OverlaySource>,
    pub registry: Option<Arc<dyn Registry>>,
    /// Parser for source files; [`crate::syntax::BasicParser`] when unset.
    pub parser: Option<Arc<dyn SourceParser>>,
    pub fetch_context: FetchContext,
    /// Filesystem below the overlay; the host filesystem when unset.
    pub base_fs: Option<Arc<dyn FileSystem>>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("dir", &self.dir)
            .field("module_root", &self.module_root)
            .field("module", &self.module)
            .field("package", &self.package)
            .field("tags", &self.tags)
            .field("tests", &self.tests)
            .field("tools", &self.tools)
            .field("data_files", &self.data_files)
            .field("all_cue_files", &self.all_cue_files)
            .field("overlay", &self.overlay.len())
            .field("registry", &self.registry.is_some())
            .finish()
    }
}

/// The canonical form of a [`Config`].
#[derive(Debug, Clone)]
pub struct Completed {
    /// Absolute working directory.
    pub dir: PathBuf,
    pub module_root: Option<PathBuf>,
    /// Module path with major suffix.
    pub module: Option<String>,
    pub mod_file: Option<ModFile>,
    pub fs: Arc<OverlayFs>,
}

impl Config {
    /// Canonicalizes the configuration.
    pub fn complete(&self) -> Result<Completed> {
        let dir = match &self.dir {
            Some(dir) if dir.is_absolute() => absolute(Path::new("/"), dir),
            other => {
                let cwd = std::env::current_dir().map_err(|e| Error::io(".", e))?;
                match other {
                    Some(dir) => absolute(&cwd, dir),
                    None => absolute(Path::new("/"), &cwd),
                }
            }
        };

        let base = self
            .base_fs
            .clone()
            .unwrap_or_else(|| Arc::new(HostFs) as Arc<dyn FileSystem>);
        let fs = Arc::new(OverlayFs::new(base, &dir, &self.overlay)?);

        let module_root = match &self.module_root {
            Some(root) => Some(absolute(&dir, root)),
            None => find_module_root(&*fs, &dir),
        };

        let mut module = self.module.as_deref().map(qualify_module);
        let mut mod_file = None;
        if let Some(root) = &module_root {
            let path = root.join(MOD_DIR).join(MANIFEST_FILE);
            match fs.read_file(&path) {
                Ok(data) => {
                    let content = String::from_utf8_lossy(&data);
                    let mf = parse_manifest(&content, &path)?;
                    if !mf.module.is_empty() {
                        let found = mf.qualified_module();
                        if let Some(want) = &module {
                            if *want != found {
                                return Err(Error::InconsistentModule {
                                    found: mf.module.clone(),
                                    want: want.clone(),
                                });
                            }
                        }
                        module = Some(found);
                    }
                    mod_file = Some(mf);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        log::debug!(
            "load config: dir={} module_root={:?} module={:?}",
            dir.display(),
            module_root,
            module
        );
        Ok(Completed {
            dir,
            module_root,
            module,
            mod_file,
            fs,
        })
    }
}

/// Nearest ancestor of `dir` (inclusive) holding a module manifest.
pub fn find_module_root(fs: &dyn FileSystem, dir: &Path) -> Option<PathBuf> {
    let mut current = Some(dir);
    while let Some(d) = current {
        let manifest = d.join(MOD_DIR).join(MANIFEST_FILE);
        if let Ok(info) = fs.stat(&manifest) {
            if !info.is_dir {
                return Some(d.to_path_buf());
            }
        }
        current = d.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::MemoryFS;

    #[test]
    fn test_parse_manifest() {
        let content = r#"
module = "example.com/app@v0"

[language]
version = "v0.9.0"

[deps."example.com/lib@v0"]
v = "v0.2.1"
default = true

[deps."example.com/lib@v1"]
v = "v1.0.0"
"#;
        let mf = parse_manifest(content, Path::new("cue.mod/module.toml")).unwrap();
        assert_eq!(mf.module, "example.com/app@v0");
        assert_eq!(
            mf.language.as_ref().and_then(|l| l.version.as_deref()),
            Some("v0.9.0")
        );
        let deps = mf.dep_versions().unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].to_string(), "example.com/lib@v0.2.1");
        let defaults = mf.default_major_versions();
        assert_eq!(defaults.get("example.com/lib").map(String::as_str), Some("v0"));
    }

    #[test]
    fn test_single_major_is_default() {
        let content = "module = \"a.test/m\"\n[deps.\"b.test/x@v1\"]\nv = \"v1.2.0\"\n";
        let mf = parse_manifest(content, Path::new("m.toml")).unwrap();
        assert_eq!(mf.qualified_module(), "a.test/m@v0");
        assert_eq!(
            mf.default_major_versions().get("b.test/x").map(String::as_str),
            Some("v1")
        );
    }

    #[test]
    fn test_parse_manifest_errors() {
        let err = parse_manifest("module = 3", Path::new("m.toml")).unwrap_err();
        assert!(matches!(err, Error::Manifest { .. }));

        let err = parse_manifest(
            "module = \"a.test/m\"\n[deps.\"b.test/x\"]\nv = \"v1.0.0\"\n",
            Path::new("m.toml"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("no major version suffix"));

        let err = parse_manifest(
            "module = \"a.test/m\"\n[deps.\"b.test/x@v1\"]\nv = \"v2.0.0\"\n",
            Path::new("m.toml"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("should be v1"));
    }

    fn memory_config(files: &[(&str, &str)], dir: &str) -> Config {
        let mut fs = MemoryFS::new();
        for (path, content) in files {
            fs.add_file_string(path, content).unwrap();
        }
        Config {
            dir: Some(PathBuf::from(dir)),
            base_fs: Some(Arc::new(fs)),
            ..Default::default()
        }
    }

    #[test]
    fn test_complete_finds_module_root() {
        let cfg = memory_config(
            &[
                ("/m/cue.mod/module.toml", "module = \"a.test/m\"\n"),
                ("/m/sub/x.cue", "package x"),
            ],
            "/m/sub",
        );
        let done = cfg.complete().unwrap();
        assert_eq!(done.dir, PathBuf::from("/m/sub"));
        assert_eq!(done.module_root, Some(PathBuf::from("/m")));
        assert_eq!(done.module.as_deref(), Some("a.test/m@v0"));
    }

    #[test]
    fn test_complete_outside_module() {
        let cfg = memory_config(&[("/w/x.cue", "package x")], "/w");
        let done = cfg.complete().unwrap();
        assert_eq!(done.module_root, None);
        assert_eq!(done.module, None);
        assert!(done.mod_file.is_none());
    }

    #[test]
    fn test_complete_inconsistent_module() {
        let mut cfg = memory_config(
            &[("/m/cue.mod/module.toml", "module = \"a.test/m@v0\"\n")],
            "/m",
        );
        cfg.module = Some("a.test/other".to_string());
        let err = cfg.complete().unwrap_err();
        assert!(matches!(err, Error::InconsistentModule { .. }));
    }

    #[test]
    fn test_complete_uses_overlay_manifest() {
        let mut cfg = memory_config(&[("/m/x.cue", "package x")], "/m");
        cfg.overlay.insert(
            PathBuf::from("/m/cue.mod/module.toml"),
            OverlaySource::from("module = \"a.test/virtual\"\n"),
        );
        let done = cfg.complete().unwrap();
        assert_eq!(done.module.as_deref(), Some("a.test/virtual@v0"));
    }
}
