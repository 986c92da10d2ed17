//! # Load Orchestration
//!
//! Units are built into an arena while imports are followed depth first.
//! Each package is loaded once per import path; the import stack detects
//! cycles. After every target is loaded, tags are injected into the syntax
//! of the root units, failures are propagated to importers once more, and
//! the arena is frozen into a graph of shared units.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Errors, PackageError};
use crate::instance::BuildUnit;
use crate::package::{self, COMMAND_LINE_ARGUMENTS};
use crate::resolver::PackageLocation;
use crate::syntax::Position;
use crate::tags::inject_tags;

use super::search::{expand, Target};
use super::stack::ImportStack;
use super::LoadContext;

/// Loads the packages named by `args`.
///
/// One unit is returned per target, in argument order; errors are reported
/// on the units rather than returned.
pub fn instances(args: &[String], config: &Config) -> Vec<BuildUnit> {
    let ctx = match LoadContext::new(config) {
        Ok(ctx) => ctx,
        Err(e) => {
            log::debug!("cannot set up load: {}", e);
            let dir = config.dir.clone().unwrap_or_else(|| PathBuf::from("."));
            let display_path = args.first().cloned().unwrap_or_else(|| ".".to_string());
            let mut unit = BuildUnit::new(display_path.clone(), dir);
            unit.display_path = display_path;
            unit.report_error(e);
            return vec![unit];
        }
    };

    let mut loader = Loader::new(&ctx);
    let mut roots = Vec::new();
    for target in expand(&ctx, args) {
        for id in loader.load_target(target) {
            if !roots.contains(&id) {
                roots.push(id);
            }
        }
    }
    inject_tags(&mut loader.units, &roots, &ctx.tags, &ctx.tag_vars, &ctx.tagger);
    loader.propagate_incomplete();
    log::debug!(
        "loaded {} root(s), {} unit(s) in total",
        roots.len(),
        loader.units.len()
    );
    loader.freeze(&roots)
}

struct Loader<'a> {
    ctx: &'a LoadContext,
    units: Vec<BuildUnit>,
    edges: Vec<Vec<usize>>,
    locations: Vec<PackageLocation>,
    /// Units still resolving their imports.
    active: Vec<bool>,
    loaded: HashMap<String, Vec<usize>>,
    stack: ImportStack,
}

impl<'a> Loader<'a> {
    fn new(ctx: &'a LoadContext) -> Self {
        Self {
            ctx,
            units: Vec::new(),
            edges: Vec::new(),
            locations: Vec::new(),
            active: Vec::new(),
            loaded: HashMap::new(),
            stack: ImportStack::new(),
        }
    }

    fn alloc(&mut self, unit: BuildUnit, location: PackageLocation) -> usize {
        self.units.push(unit);
        self.edges.push(Vec::new());
        self.locations.push(location);
        self.active.push(false);
        self.units.len() - 1
    }

    fn error_unit(&mut self, display_path: &str, err: Error) -> usize {
        let cwd = &self.ctx.completed.dir;
        let mut unit = BuildUnit::new(display_path, cwd.clone());
        unit.display_path = display_path.to_string();
        unit.report_error(err);
        let location = self.ctx.resolver.main_location(cwd);
        self.alloc(unit, location)
    }

    fn load_target(&mut self, target: Target) -> Vec<usize> {
        match target {
            Target::Failed {
                display_path,
                error,
            } => vec![self.error_unit(&display_path, error)],
            Target::Files(files) => vec![self.load_files(&files)],
            Target::Package {
                location,
                display_path,
                wildcard,
            } => {
                let ids = self.load_location(location, Some(display_path));
                if !wildcard {
                    return ids;
                }
                ids.into_iter()
                    .filter(|&id| !only_no_usable_files(&self.units[id]))
                    .collect()
            }
        }
    }

    fn load_files(&mut self, files: &[PathBuf]) -> usize {
        let cwd = self.ctx.completed.dir.clone();
        let fs = self.ctx.completed.fs.clone();
        let unit = package::build_files(self.ctx.build_context(), &*fs, &cwd, files);
        let mut location = self.ctx.resolver.main_location(&cwd);
        location.import_path = COMMAND_LINE_ARGUMENTS.to_string();
        let id = self.alloc(unit, location);
        self.stack.push(COMMAND_LINE_ARGUMENTS);
        self.active[id] = true;
        self.resolve_imports(id);
        self.active[id] = false;
        self.stack.pop();
        id
    }

    /// Loads the package at `location`, or returns the units already loaded
    /// for its import path.
    fn load_location(&mut self, location: PackageLocation, display_path: Option<String>) -> Vec<usize> {
        if let Some(ids) = self.loaded.get(&location.import_path) {
            return ids.clone();
        }
        log::debug!("loading {} from {}", location.import_path, location.dir.display());

        let mut unit = BuildUnit::new(location.import_path.clone(), location.dir.clone());
        unit.display_path = display_path.unwrap_or_else(|| location.import_path.clone());
        unit.module = location.module.clone();
        unit.root = location.root.clone();
        unit.local = location.local;

        let units = package::build_dir(
            self.ctx.build_context(),
            location.fs.as_ref(),
            unit,
            &location.selector,
        );
        let key = location.import_path.clone();
        let mut ids = Vec::with_capacity(units.len());
        for unit in units {
            let import_path = unit.import_path.clone();
            let id = self.alloc(unit, location.clone());
            self.active[id] = true;
            self.loaded.entry(import_path).or_insert_with(|| vec![id]);
            ids.push(id);
        }
        self.loaded.insert(key.clone(), ids.clone());

        self.stack.push(key);
        for &id in &ids {
            self.resolve_imports(id);
        }
        self.stack.pop();
        for &id in &ids {
            self.active[id] = false;
        }
        ids
    }

    fn is_cycle(&self, import_path: &str) -> bool {
        self.stack.contains(import_path)
            || self
                .loaded
                .get(import_path)
                .is_some_and(|ids| ids.iter().any(|&id| self.active[id]))
    }

    fn resolve_imports(&mut self, id: usize) {
        let imports: Vec<(String, Option<Position>)> = self.units[id]
            .imports
            .iter()
            .map(|(path, positions)| (path.clone(), positions.first().cloned()))
            .collect();
        let from = self.locations[id].clone();

        for (raw, pos) in imports {
            let location = match self.ctx.resolver.resolve(&raw, &from) {
                Ok(location) => location,
                Err(e) => {
                    log::debug!("cannot resolve {} from {}: {}", raw, from.import_path, e);
                    let mut import_stack = self.stack.copy();
                    import_stack.push(raw.clone());
                    let err = Error::Package(PackageError {
                        import_stack,
                        pos,
                        error: Box::new(e),
                        import_cycle: false,
                    });
                    let dep = self.error_unit(&raw, err);
                    self.edges[id].push(dep);
                    self.units[id].incomplete = true;
                    continue;
                }
            };

            if self.is_cycle(&location.import_path) {
                let mut import_stack = self.stack.copy();
                import_stack.push(location.import_path.clone());
                let err = Error::Package(PackageError {
                    import_stack,
                    pos,
                    error: Box::new(Error::ImportCycle {
                        path: location.import_path.clone(),
                    }),
                    import_cycle: true,
                });
                self.units[id].report_error(err);
                self.units[id].incomplete = true;
                continue;
            }

            let deps = self.load_location(location, None);
            let Some(&dep) = deps.first() else {
                continue;
            };
            self.edges[id].push(dep);
            if !self.units[dep].is_ok() || self.units[dep].incomplete {
                self.units[id].incomplete = true;
            }
        }
    }

    /// Marks every unit with a failed or incomplete dependency as
    /// incomplete, transitively.
    fn propagate_incomplete(&mut self) {
        let mut changed = true;
        while changed {
            changed = false;
            for id in 0..self.units.len() {
                if self.units[id].incomplete {
                    continue;
                }
                let failed = self.edges[id]
                    .iter()
                    .any(|&dep| !self.units[dep].is_ok() || self.units[dep].incomplete);
                if failed {
                    self.units[id].incomplete = true;
                    changed = true;
                }
            }
        }
    }

    /// Moves the arena into shared units; returns the roots in order.
    fn freeze(self, roots: &[usize]) -> Vec<BuildUnit> {
        let mut slots: Vec<Option<BuildUnit>> = self.units.into_iter().map(Some).collect();
        let mut frozen: HashMap<usize, Arc<BuildUnit>> = HashMap::new();
        let mut visiting = HashSet::new();
        roots
            .iter()
            .filter_map(|&id| freeze_unit(id, &self.edges, &mut slots, &mut frozen, &mut visiting))
            .map(|unit| Arc::try_unwrap(unit).unwrap_or_else(|shared| (*shared).clone()))
            .collect()
    }
}

fn freeze_unit(
    id: usize,
    edges: &[Vec<usize>],
    slots: &mut [Option<BuildUnit>],
    frozen: &mut HashMap<usize, Arc<BuildUnit>>,
    visiting: &mut HashSet<usize>,
) -> Option<Arc<BuildUnit>> {
    if let Some(unit) = frozen.get(&id) {
        return Some(Arc::clone(unit));
    }
    if !visiting.insert(id) {
        return None;
    }
    let mut deps: Vec<Arc<BuildUnit>> = edges[id]
        .iter()
        .filter_map(|&dep| freeze_unit(dep, edges, slots, frozen, visiting))
        .collect();
    deps.sort_by(|a, b| a.import_path.cmp(&b.import_path));
    deps.dedup_by(|a, b| a.import_path == b.import_path);

    let mut unit = slots[id].take()?;
    unit.dependencies = deps;
    let unit = Arc::new(unit);
    frozen.insert(id, Arc::clone(&unit));
    visiting.remove(&id);
    Some(unit)
}

/// Wildcard matches whose only problem is the lack of usable files are
/// skipped.
fn only_no_usable_files(unit: &BuildUnit) -> bool {
    match &unit.err {
        Some(errs) => {
            !unit.incomplete && errs.iter().all(|e| matches!(e, Error::NoUsableFiles { .. }))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::{FileInfo, FileSystem, MemoryFS};
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct CountingFs {
        inner: MemoryFS,
        listed: Mutex<HashMap<PathBuf, usize>>,
    }

    impl CountingFs {
        fn listed(&self, dir: &str) -> usize {
            self.listed
                .lock()
                .unwrap()
                .get(Path::new(dir))
                .copied()
                .unwrap_or(0)
        }
    }

    impl FileSystem for CountingFs {
        fn stat(&self, path: &Path) -> crate::error::Result<FileInfo> {
            self.inner.stat(path)
        }

        fn read_file(&self, path: &Path) -> crate::error::Result<Vec<u8>> {
            self.inner.read_file(path)
        }

        fn read_dir(&self, path: &Path) -> crate::error::Result<Vec<FileInfo>> {
            *self
                .listed
                .lock()
                .unwrap()
                .entry(path.to_path_buf())
                .or_insert(0) += 1;
            self.inner.read_dir(path)
        }
    }

    fn config(files: &[(&str, &str)]) -> Config {
        let mut fs = MemoryFS::new();
        for (path, content) in files {
            fs.add_file_string(path, content).unwrap();
        }
        Config {
            dir: Some(PathBuf::from("/m")),
            base_fs: Some(Arc::new(fs)),
            ..Default::default()
        }
    }

    const MANIFEST: (&str, &str) = ("/m/cue.mod/module.toml", "module = \"a.test/m\"\n");

    #[test]
    fn test_dependencies_are_shared() {
        let cfg = config(&[
            MANIFEST,
            ("/m/a/a.cue", "package a\n\nimport \"a.test/m/c\"\n"),
            ("/m/b/b.cue", "package b\n\nimport \"a.test/m/c\"\n"),
            ("/m/c/c.cue", "package c\n"),
        ]);
        let units = instances(&["./a".to_string(), "./b".to_string()], &cfg);
        assert_eq!(units.len(), 2);
        let ca = units[0].dependency("a.test/m/c").unwrap();
        let cb = units[1].dependency("a.test/m/c").unwrap();
        assert!(Arc::ptr_eq(ca, cb));
        assert!(units.iter().all(|u| u.is_ok() && !u.incomplete));
    }

    #[test]
    fn test_import_cycle() {
        let cfg = config(&[
            MANIFEST,
            ("/m/a/a.cue", "package a\n\nimport \"a.test/m/b\"\n"),
            ("/m/b/b.cue", "package b\n\nimport \"a.test/m/a\"\n"),
        ]);
        let units = instances(&["./a".to_string()], &cfg);
        let a = &units[0];
        assert!(a.incomplete);
        let b = a.dependency("a.test/m/b").unwrap();
        let err = b.err.as_ref().unwrap().first().unwrap();
        assert!(err.is_import_cycle());
        match err {
            Error::Package(p) => assert_eq!(
                p.import_stack,
                vec!["a.test/m/a", "a.test/m/b", "a.test/m/a"]
            ),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_failing_dependency_marks_importer() {
        let cfg = config(&[MANIFEST, ("/m/a/a.cue", "package a\n\nimport \"a.test/m/gone\"\n")]);
        let units = instances(&["./a".to_string()], &cfg);
        let a = &units[0];
        assert!(a.is_ok());
        assert!(a.incomplete);
        let dep = &a.dependencies[0];
        match dep.err.as_ref().unwrap().first().unwrap() {
            Error::Package(p) => {
                assert_eq!(p.import_stack, vec!["a.test/m/a", "a.test/m/gone"]);
                assert!(p.pos.is_some());
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_wildcard_drops_empty_matches() {
        let cfg = config(&[
            MANIFEST,
            ("/m/a/a.cue", "package a\n"),
            ("/m/t/t_test.cue", "package t\n"),
        ]);
        let units = instances(&["./...".to_string()], &cfg);
        let paths: Vec<_> = units.iter().map(|u| u.display_path.as_str()).collect();
        assert_eq!(paths, vec!["./a"]);
    }

    #[test]
    fn test_bad_config_gives_error_unit() {
        let mut cfg = config(&[MANIFEST]);
        cfg.module = Some("a.test/other".to_string());
        let units = instances(&[], &cfg);
        assert_eq!(units.len(), 1);
        assert!(matches!(
            units[0].err.as_ref().unwrap().first().unwrap(),
            Error::InconsistentModule { .. }
        ));
    }

    #[test]
    fn test_files_unit() {
        let cfg = config(&[
            MANIFEST,
            ("/m/x.cue", "import \"a.test/m/c\"\n\nx: 1\n"),
            ("/m/c/c.cue", "package c\n"),
        ]);
        let units = instances(&["x.cue".to_string()], &cfg);
        let unit = &units[0];
        assert_eq!(unit.display_path, COMMAND_LINE_ARGUMENTS);
        assert!(unit.user);
        assert!(unit.is_ok(), "{:?}", unit.err);
        assert!(unit.dependency("a.test/m/c").is_some());
    }

    #[test]
    fn test_unknown_tag_reported_everywhere() {
        let mut cfg = config(&[MANIFEST, ("/m/a/a.cue", "package a\n\nx: 1\n")]);
        cfg.tags = vec!["env=prod".to_string()];
        let units = instances(&["./a".to_string()], &cfg);
        assert!(matches!(
            units[0].err.as_ref().unwrap().first().unwrap(),
            Error::UnknownTag { .. }
        ));
    }

    #[test]
    fn test_tags_leave_dependencies_alone() {
        let mut cfg = config(&[
            MANIFEST,
            ("/m/a/a.cue", "package a\n\nimport \"a.test/m/c\"\n"),
            (
                "/m/c/c.cue",
                "package c\n\nenv: string @tag(env)\nx: string @tag(x,var=missing)\n",
            ),
        ]);
        cfg.tags = vec!["env=prod".to_string()];
        cfg.tag_vars = Some(HashMap::new());
        let units = instances(&["./a".to_string()], &cfg);

        let a = &units[0];
        let errs = a.err.as_ref().unwrap();
        assert_eq!(errs.len(), 1);
        assert!(matches!(errs.first().unwrap(), Error::UnknownTag { tag } if tag == "env"));
        let c = a.dependency("a.test/m/c").unwrap();
        assert!(c.is_ok(), "{:?}", c.err);
        assert!(!c.syntax[0].render().contains("prod"));
        assert!(!a.incomplete);
    }

    #[test]
    fn test_tag_error_on_imported_root_marks_importer() {
        let mut cfg = config(&[
            MANIFEST,
            ("/m/a/a.cue", "package a\n\nimport \"a.test/m/c\"\n"),
            ("/m/c/c.cue", "package c\n\nx: string @tag(x,var=missing)\n"),
        ]);
        cfg.tag_vars = Some(HashMap::new());
        let units = instances(&["./a".to_string(), "./c".to_string()], &cfg);

        for unit in &units {
            assert!(matches!(
                unit.err.as_ref().unwrap().first().unwrap(),
                Error::UndeclaredTagVar { name } if name == "missing"
            ));
        }
        assert!(units[0].incomplete);
        assert!(!units[1].incomplete);
        let c = units[0].dependency("a.test/m/c").unwrap();
        assert!(!c.is_ok());
    }

    #[test]
    fn test_resolved_directory_listed_once() {
        let mut fs = MemoryFS::new();
        fs.add_file_string(MANIFEST.0, MANIFEST.1).unwrap();
        fs.add_file_string("/m/a/a.cue", "package a\n\nimport \"a.test/m/c\"\n")
            .unwrap();
        fs.add_file_string("/m/c/c.cue", "package c\n").unwrap();
        let counting = Arc::new(CountingFs {
            inner: fs,
            listed: Mutex::new(HashMap::new()),
        });
        let cfg = Config {
            dir: Some(PathBuf::from("/m")),
            base_fs: Some(counting.clone()),
            ..Default::default()
        };

        let units = instances(&["./a".to_string()], &cfg);
        assert!(units[0].is_ok(), "{:?}", units[0].err);
        assert_eq!(counting.listed("/m/c"), 1);

        let units = instances(&["./...".to_string()], &cfg);
        assert_eq!(units.len(), 2);
        // Once by the walk, once by the shared scan.
        assert_eq!(counting.listed("/m/c"), 3);
    }

    #[test]
    fn test_missing_directory() {
        let cfg = config(&[MANIFEST]);
        let units = instances(&["./missing".to_string()], &cfg);
        let errs: &Errors = units[0].err.as_ref().unwrap();
        assert_eq!(errs.len(), 1);
        assert!(errs.first().unwrap().is_not_found());
    }
}
