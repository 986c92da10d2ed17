//! # Package Builder
//!
//! Groups the files of a directory, and of its ancestors up to the module
//! root, into build units.
//!
//! Every considered file ends up in exactly one list of a unit: build,
//! ignored, orphaned, invalid or unknown. Files are checked in this order:
//!
//! 1.  hidden names (`.` or `_` prefix), unknown types and data files;
//! 2.  header parse errors;
//! 3.  the package the file declares, which picks the target unit;
//! 4.  `@if` / `@ignore` build constraints (unless `all_cue_files` is set);
//! 5.  package consistency (`MultiplePackages`, or `package is X, want Y`);
//! 6.  test and tool files outside their modes.
//!
//! Imports of the files that make it into the build are collected with the
//! positions they are imported from.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{DirCache, SyntaxCache};
use crate::error::{Error, Errors};
use crate::filesystem::FileSystem;
use crate::filetypes::Encoding;
use crate::instance::{BuildUnit, ExcludeReason, SourceFile};
use crate::module::ImportPath;
use crate::scanner::{is_test_file, is_tool_file, ScannedFile};
use crate::syntax::{ParseMode, SyntaxFile};
use crate::tags::Tagger;

/// Display path and import path of a unit built from explicit files.
pub const COMMAND_LINE_ARGUMENTS: &str = "command-line-arguments";

/// Which package of a directory to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSelector {
    /// Infer from the first file; a second package is an error.
    Unique,
    /// Only files without a package clause.
    Anonymous,
    /// Every package, one unit each.
    All,
    Named(String),
}

impl PackageSelector {
    pub fn parse(package: &str) -> Self {
        match package {
            "" => PackageSelector::Unique,
            "_" => PackageSelector::Anonymous,
            "*" => PackageSelector::All,
            name => PackageSelector::Named(name.to_string()),
        }
    }
}

/// Switches that decide which files qualify.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    pub tests: bool,
    pub tools: bool,
    pub data_files: bool,
    pub all_cue_files: bool,
}

/// Shared state the builder needs from the load.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub syntax: &'a SyntaxCache,
    pub dirs: &'a DirCache,
    pub tagger: &'a Tagger,
    pub options: BuildOptions,
    /// Bounds the ancestor walk of units outside any module.
    pub cwd: &'a Path,
}

struct FileProcessor<'a> {
    ctx: BuildContext<'a>,
    units: Vec<BuildUnit>,
    /// First build file of each unit, for `MultiplePackages`.
    first_files: Vec<String>,
    multiple_reported: Vec<bool>,
    all_packages: bool,
    allow_anonymous: bool,
    /// Files of other packages are ignored rather than reported.
    ignore_other: bool,
}

impl<'a> FileProcessor<'a> {
    fn new(ctx: BuildContext<'a>, mut unit: BuildUnit, selector: &PackageSelector) -> Self {
        let mut ignore_other = false;
        match selector {
            PackageSelector::Anonymous => {
                unit.package_name = "_".to_string();
                ignore_other = true;
            }
            PackageSelector::Named(name) => {
                unit.package_name = name.clone();
                ignore_other = true;
            }
            PackageSelector::Unique | PackageSelector::All => {}
        }
        Self {
            ctx,
            units: vec![unit],
            first_files: vec![String::new()],
            multiple_reported: vec![false],
            all_packages: *selector == PackageSelector::All,
            allow_anonymous: false,
            ignore_other,
        }
    }

    fn sibling(&mut self, pkg: &str) -> usize {
        if let Some(i) = self.units.iter().position(|u| u.package_name == pkg) {
            return i;
        }
        let primary = &self.units[0];
        let mut ip = ImportPath::parse(&primary.import_path);
        ip.qualifier = pkg.to_string();
        let unit = BuildUnit {
            import_path: ip.canonical(),
            display_path: primary.display_path.clone(),
            package_name: pkg.to_string(),
            module: primary.module.clone(),
            root: primary.root.clone(),
            dir: primary.dir.clone(),
            local: primary.local,
            ..Default::default()
        };
        self.units.push(unit);
        self.first_files.push(String::new());
        self.multiple_reported.push(false);
        self.units.len() - 1
    }

    fn bad_file(&mut self, target: usize, mut file: SourceFile, err: Error) {
        file.error = Some(err.clone());
        let unit = &mut self.units[target];
        unit.invalid_files.push(file);
        unit.report_error(err);
    }

    fn ignore(&mut self, target: usize, file: SourceFile, reason: ExcludeReason) {
        self.units[target].ignored_files.push(file.excluded(reason));
    }

    /// Adds a file of the unit's own directory (`in_unit_dir`) or of an
    /// ancestor. Reports whether the file became a build file.
    fn add(&mut self, scanned: &ScannedFile, in_unit_dir: bool, explicit: bool) -> bool {
        let name = scanned.name.as_str();
        let file = SourceFile::new(&scanned.path, scanned.encoding);

        let dot_allowed = explicit && name.starts_with('.');
        if scanned.is_hidden() && !dot_allowed {
            if in_unit_dir {
                self.ignore(0, file, ExcludeReason::Hidden);
            }
            return false;
        }

        match scanned.encoding {
            Encoding::Cue => {}
            Encoding::Unknown => {
                if in_unit_dir {
                    self.units[0].unknown_files.push(file);
                }
                return false;
            }
            _ => {
                if !in_unit_dir {
                    return false;
                }
                if self.ctx.options.data_files {
                    self.units[0].build_files.push(file);
                    return true;
                }
                self.units[0]
                    .orphaned_files
                    .push(file.excluded(ExcludeReason::DataFile));
                return false;
            }
        }

        let header: Arc<SyntaxFile> = match &scanned.header {
            Some(Ok(header)) => Arc::clone(header),
            Some(Err(e)) => {
                self.bad_file(0, file, e.clone());
                return false;
            }
            None => return false,
        };

        let pkg = header.package_name().unwrap_or("_").to_string();
        let target = match self.route(&pkg, in_unit_dir) {
            Some(target) => target,
            None => {
                self.ignore(0, file, ExcludeReason::AnonymousPackage);
                return false;
            }
        };

        if !self.ctx.options.all_cue_files {
            let mut consulted = Vec::new();
            let tagger = self.ctx.tagger;
            let result = crate::buildattr::should_build(&header, &mut |tag: &str| {
                consulted.push(tag.to_string());
                tagger.is_set(tag)
            });
            for tag in &consulted {
                self.units[target].add_tag(tag);
            }
            match result {
                Ok(None) => {}
                Ok(Some(reason)) => {
                    self.ignore(target, file, reason);
                    return false;
                }
                Err(e) => {
                    self.bad_file(target, file, e);
                    return false;
                }
            }
        }

        if pkg != "_" {
            let current = self.units[target].package_name.clone();
            if current.is_empty() {
                self.units[target].package_name = pkg.clone();
                self.first_files[target] = name.to_string();
            } else if pkg != current {
                if self.ignore_other || !in_unit_dir {
                    self.ignore(
                        target,
                        file,
                        ExcludeReason::WrongPackage {
                            found: pkg,
                            want: current,
                        },
                    );
                    return false;
                }
                if !self.all_packages {
                    let err = Error::MultiplePackages {
                        dir: self.units[target].dir.clone(),
                        packages: [current, pkg],
                        files: [self.first_files[target].clone(), name.to_string()],
                    };
                    if self.multiple_reported[target] {
                        let mut file = file;
                        file.error = Some(err);
                        self.units[target].invalid_files.push(file);
                    } else {
                        self.multiple_reported[target] = true;
                        self.bad_file(target, file, err);
                    }
                    return false;
                }
            }
        }

        let is_test = is_test_file(name);
        if is_test && !self.ctx.options.tests {
            self.ignore(target, file, ExcludeReason::TestFile);
            return false;
        }
        if is_tool_file(name) && !self.ctx.options.tools {
            self.ignore(target, file, ExcludeReason::ToolFile);
            return false;
        }

        let unit = &mut self.units[target];
        for spec in &header.imports {
            unit.imports
                .entry(spec.path.clone())
                .or_default()
                .push(spec.pos.clone());
        }
        unit.build_files.push(file);
        true
    }

    /// Picks the unit a file of package `pkg` belongs to. `None` means the
    /// file is anonymous and anonymous files are not wanted.
    fn route(&mut self, pkg: &str, in_unit_dir: bool) -> Option<usize> {
        if pkg == self.units[0].package_name || self.allow_anonymous {
            return Some(0);
        }
        if !in_unit_dir {
            if let Some(i) = self.units.iter().position(|u| u.package_name == pkg) {
                return Some(i);
            }
            return if pkg == "_" { None } else { Some(0) };
        }
        if self.all_packages && pkg != "_" {
            if self.units[0].package_name.is_empty() {
                return Some(0);
            }
            return Some(self.sibling(pkg));
        }
        if pkg != "_" {
            return Some(0);
        }
        None
    }

    fn finish(self, fs: &dyn FileSystem) -> Vec<BuildUnit> {
        let all_packages = self.all_packages;
        let syntax = self.ctx.syntax;
        let mut units = self.units;
        if all_packages && !units[0].package_name.is_empty() {
            let mut ip = ImportPath::parse(&units[0].import_path);
            ip.qualifier = units[0].package_name.clone();
            units[0].import_path = ip.canonical();
        }
        for unit in &mut units {
            finalize(unit, fs, syntax);
        }
        units
    }
}

fn sort_files(files: &mut [SourceFile]) {
    // Parent directories first, then byte-wise by name.
    files.sort_by(|a, b| {
        let depth = |f: &SourceFile| f.filename.parent().map_or(0, |p| p.components().count());
        depth(a)
            .cmp(&depth(b))
            .then_with(|| a.name().as_bytes().cmp(b.name().as_bytes()))
    });
}

/// Normalizes a filled unit, reports `NoUsableFiles`, and fully parses its
/// `.cue` build files.
fn finalize(unit: &mut BuildUnit, fs: &dyn FileSystem, syntax: &SyntaxCache) {
    sort_files(&mut unit.build_files);
    sort_files(&mut unit.ignored_files);
    sort_files(&mut unit.orphaned_files);
    sort_files(&mut unit.invalid_files);
    sort_files(&mut unit.unknown_files);
    unit.all_tags.sort();
    for positions in unit.imports.values_mut() {
        positions.sort();
        positions.dedup();
    }

    if unit.build_files.is_empty() {
        if unit.is_ok() {
            let excluded = unit
                .ignored_files
                .iter()
                .filter(|f| f.exclude_reason != Some(ExcludeReason::Hidden))
                .map(|f| {
                    let reason = f
                        .exclude_reason
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    (f.name(), reason)
                })
                .collect();
            unit.report_error(Error::NoUsableFiles {
                display_path: unit.display_path.clone(),
                excluded,
            });
        }
        return;
    }
    if unit.package_name.is_empty() {
        unit.package_name = "_".to_string();
    }

    let mut errors = Vec::new();
    for file in &mut unit.build_files {
        match fs.read_file(&file.filename) {
            Ok(bytes) => file.source = Some(Arc::from(bytes)),
            Err(e) => errors.push(e),
        }
    }
    for e in errors {
        unit.report_error(e);
    }

    for file in &unit.build_files {
        if file.encoding != Encoding::Cue {
            continue;
        }
        match syntax.parse(fs, &file.filename, ParseMode::Full) {
            Ok(tree) => unit.syntax.push(tree),
            Err(e) => {
                unit.err = Some(Errors::append_opt(unit.err.take(), e));
            }
        }
    }
}

/// Directories above `dir` whose files join the package: up to and
/// including the module root, or the working directory outside a module.
fn ancestor_dirs(dir: &Path, root: Option<&Path>, cwd: &Path) -> Vec<PathBuf> {
    let bound = root.unwrap_or(cwd);
    let mut out = Vec::new();
    if dir == bound || !dir.starts_with(bound) {
        return out;
    }
    let mut current = dir.parent();
    while let Some(parent) = current {
        if !parent.starts_with(bound) {
            break;
        }
        out.push(parent.to_path_buf());
        if parent == bound {
            break;
        }
        current = parent.parent();
    }
    out
}

/// Builds the unit for `unit.dir`, plus sibling units in all-packages mode.
///
/// `unit` arrives with its import path, display path and module metadata
/// set; the returned units have their file lists filled and finalized.
pub fn build_dir(
    ctx: BuildContext<'_>,
    fs: &dyn FileSystem,
    mut unit: BuildUnit,
    selector: &PackageSelector,
) -> Vec<BuildUnit> {
    let scan = match ctx.dirs.scan(fs, ctx.syntax, &unit.dir) {
        Ok(scan) => scan,
        Err(e) => {
            unit.report_error(e);
            return vec![unit];
        }
    };

    let dir = unit.dir.clone();
    let root = unit.root.clone();
    let mut fp = FileProcessor::new(ctx, unit, selector);
    for file in &scan.files {
        fp.add(file, true, false);
    }

    let has_package = fp.units.iter().any(|u| !u.package_name.is_empty());
    if has_package && !scan.is_module_root {
        fp.ignore_other = true;
        for parent in ancestor_dirs(&dir, root.as_deref(), ctx.cwd) {
            let parent_scan = match ctx.dirs.scan(fs, ctx.syntax, &parent) {
                Ok(scan) => scan,
                Err(e) => {
                    log::debug!("cannot scan ancestor {}: {}", parent.display(), e);
                    break;
                }
            };
            // A nested module ends the package.
            if parent_scan.is_module_root && root.as_deref() != Some(parent.as_path()) {
                break;
            }
            for file in &parent_scan.files {
                fp.add(file, false, false);
            }
        }
    }

    let units = fp.finish(fs);
    log::debug!(
        "built {} unit(s) for {}: {:?}",
        units.len(),
        dir.display(),
        units.iter().map(|u| u.build_files.len()).collect::<Vec<_>>()
    );
    units
}

/// Builds the unit for files named on the command line.
///
/// Anonymous files are allowed and a leading `.` does not hide a file.
pub fn build_files(
    ctx: BuildContext<'_>,
    fs: &dyn FileSystem,
    dir: &Path,
    files: &[PathBuf],
) -> BuildUnit {
    let mut unit = BuildUnit::new(COMMAND_LINE_ARGUMENTS, dir);
    unit.display_path = COMMAND_LINE_ARGUMENTS.to_string();
    unit.user = true;
    unit.local = true;

    for path in files {
        match fs.stat(path) {
            Ok(info) if info.is_dir => {
                unit.report_error(Error::InvalidPath {
                    path: path.clone(),
                    message: "file is a directory".to_string(),
                });
                return unit;
            }
            Ok(_) => {}
            Err(e) => {
                unit.report_error(e);
                return unit;
            }
        }
    }

    let mut fp = FileProcessor::new(ctx, unit, &PackageSelector::Unique);
    fp.allow_anonymous = true;
    for path in files {
        let scanned = ScannedFile::classify(fs, ctx.syntax, path, true);
        fp.add(&scanned, true, true);
    }
    let mut units = fp.finish(fs);
    units.swap_remove(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::MemoryFS;
    use crate::syntax::BasicParser;

    struct Fixture {
        fs: MemoryFS,
        syntax: SyntaxCache,
        dirs: DirCache,
        tagger: Tagger,
        options: BuildOptions,
    }

    impl Fixture {
        fn new(files: &[(&str, &str)]) -> Self {
            let mut fs = MemoryFS::new();
            for (path, content) in files {
                fs.add_file_string(path, content).unwrap();
            }
            Self {
                fs,
                syntax: SyntaxCache::new(Arc::new(BasicParser)),
                dirs: DirCache::new(),
                tagger: Tagger::new(&[]),
                options: BuildOptions::default(),
            }
        }

        fn ctx(&self) -> BuildContext<'_> {
            BuildContext {
                syntax: &self.syntax,
                dirs: &self.dirs,
                tagger: &self.tagger,
                options: self.options,
                cwd: Path::new("/m"),
            }
        }

        fn build(&self, dir: &str, selector: PackageSelector) -> Vec<BuildUnit> {
            let mut unit = BuildUnit::new("a.test/m/x", dir);
            unit.display_path = "./x".to_string();
            unit.root = Some(PathBuf::from("/m"));
            build_dir(self.ctx(), &self.fs, unit, &selector)
        }
    }

    fn names(files: &[SourceFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.filename.to_string_lossy().into_owned())
            .collect()
    }

    const MANIFEST: (&str, &str) = ("/m/cue.mod/module.toml", "module = \"a.test/m\"\n");

    #[test]
    fn test_single_package_with_ancestors() {
        let fx = Fixture::new(&[
            MANIFEST,
            ("/m/root.cue", "package p\n"),
            ("/m/other.cue", "package q\n"),
            ("/m/x/b.cue", "package p\n\nimport \"a.test/m/y\"\n"),
            ("/m/x/a.cue", "package p\n\nimport \"a.test/m/y\"\n"),
            ("/m/x/.hidden.cue", "package p\n"),
            ("/m/x/data.json", "{}"),
            ("/m/x/notes.md", ""),
        ]);
        let units = fx.build("/m/x", PackageSelector::Unique);
        assert_eq!(units.len(), 1);
        let unit = &units[0];
        assert!(unit.is_ok(), "{:?}", unit.err);
        assert_eq!(unit.package_name, "p");
        assert_eq!(
            names(&unit.build_files),
            vec!["/m/root.cue", "/m/x/a.cue", "/m/x/b.cue"]
        );
        assert_eq!(unit.syntax.len(), 3);
        assert_eq!(names(&unit.orphaned_files), vec!["/m/x/data.json"]);
        assert_eq!(names(&unit.unknown_files), vec!["/m/x/notes.md"]);
        assert_eq!(
            names(&unit.ignored_files),
            vec!["/m/other.cue", "/m/x/.hidden.cue"]
        );
        assert_eq!(
            unit.ignored_files[0].exclude_reason,
            Some(ExcludeReason::WrongPackage {
                found: "q".to_string(),
                want: "p".to_string()
            })
        );
        assert_eq!(unit.import_paths(), vec!["a.test/m/y"]);
        assert_eq!(unit.imports["a.test/m/y"].len(), 2);
    }

    #[test]
    fn test_multiple_packages() {
        let fx = Fixture::new(&[
            MANIFEST,
            ("/m/x/a.cue", "package p\n"),
            ("/m/x/b.cue", "package q\n"),
            ("/m/x/c.cue", "package r\n"),
        ]);
        let units = fx.build("/m/x", PackageSelector::Unique);
        let err = units[0].err.as_ref().unwrap();
        assert_eq!(err.len(), 1);
        match err.first().unwrap() {
            Error::MultiplePackages {
                packages, files, ..
            } => {
                assert_eq!(packages, &["p".to_string(), "q".to_string()]);
                assert_eq!(files, &["a.cue".to_string(), "b.cue".to_string()]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(units[0].invalid_files.len(), 2);
    }

    #[test]
    fn test_named_package_ignores_others() {
        let fx = Fixture::new(&[
            MANIFEST,
            ("/m/x/a.cue", "package p\n"),
            ("/m/x/b.cue", "package q\n"),
            ("/m/x/c.cue", "x: 1\n"),
        ]);
        let units = fx.build("/m/x", PackageSelector::Named("q".to_string()));
        let unit = &units[0];
        assert!(unit.is_ok());
        assert_eq!(names(&unit.build_files), vec!["/m/x/b.cue"]);
        let reasons: Vec<_> = unit
            .ignored_files
            .iter()
            .map(|f| f.exclude_reason.as_ref().unwrap().to_string())
            .collect();
        assert_eq!(reasons, vec!["package is p, want q", "no package name"]);
    }

    #[test]
    fn test_anonymous_selector() {
        let fx = Fixture::new(&[
            MANIFEST,
            ("/m/x/a.cue", "package p\n"),
            ("/m/x/c.cue", "x: 1\n"),
        ]);
        let units = fx.build("/m/x", PackageSelector::Anonymous);
        assert!(units[0].is_ok());
        assert_eq!(units[0].package_name, "_");
        assert_eq!(names(&units[0].build_files), vec!["/m/x/c.cue"]);
    }

    #[test]
    fn test_all_packages_spawns_siblings() {
        let fx = Fixture::new(&[
            MANIFEST,
            ("/m/x/a.cue", "package p\n"),
            ("/m/x/b.cue", "package q\n"),
            ("/m/x/c.cue", "package p\n"),
        ]);
        let units = fx.build("/m/x", PackageSelector::All);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].import_path, "a.test/m/x:p");
        assert_eq!(names(&units[0].build_files), vec!["/m/x/a.cue", "/m/x/c.cue"]);
        assert_eq!(units[1].import_path, "a.test/m/x:q");
        assert_eq!(units[1].package_name, "q");
        assert_eq!(units[1].dir, PathBuf::from("/m/x"));
        assert!(units.iter().all(BuildUnit::is_ok));
    }

    #[test]
    fn test_build_constraints_exclude_all() {
        let fx = Fixture::new(&[MANIFEST, ("/m/x/x.cue", "@if(foo)\n\npackage p\n")]);
        let units = fx.build("/m/x", PackageSelector::Unique);
        let err = units[0].err.as_ref().unwrap();
        assert!(matches!(err.first().unwrap(), Error::NoUsableFiles { .. }));
        let message = err.to_string();
        assert!(message.contains("build constraints exclude all .cue files in ./x"));
        assert!(message.contains("x.cue: @if(foo) did not match"));
        assert_eq!(units[0].all_tags, vec!["foo"]);
    }

    #[test]
    fn test_build_constraint_satisfied() {
        let mut fx = Fixture::new(&[
            MANIFEST,
            ("/m/x/x.cue", "@if(foo)\n\npackage p\n"),
            ("/m/x/y.cue", "@if(!foo)\n\npackage p\n"),
        ]);
        fx.tagger = Tagger::new(&["foo".to_string()]);
        let units = fx.build("/m/x", PackageSelector::Unique);
        assert!(units[0].is_ok());
        assert_eq!(names(&units[0].build_files), vec!["/m/x/x.cue"]);
        assert!(fx.tagger.was_used("foo"));
    }

    #[test]
    fn test_all_cue_files_skips_constraints() {
        let mut fx = Fixture::new(&[MANIFEST, ("/m/x/x.cue", "@if(foo)\n\npackage p\n")]);
        fx.options.all_cue_files = true;
        let units = fx.build("/m/x", PackageSelector::Unique);
        assert!(units[0].is_ok());
        assert_eq!(units[0].build_files.len(), 1);
    }

    #[test]
    fn test_empty_directory() {
        let fx = Fixture::new(&[MANIFEST, ("/m/x/sub/a.cue", "package p\n")]);
        let units = fx.build("/m/x", PackageSelector::Unique);
        assert_eq!(
            units[0].err.as_ref().unwrap().to_string(),
            "no .cue files in ./x"
        );
    }

    #[test]
    fn test_test_and_tool_files() {
        let mut fx = Fixture::new(&[
            MANIFEST,
            ("/m/x/a.cue", "package p\n"),
            ("/m/x/a_test.cue", "package p\n\nimport \"a.test/m/testing\"\n"),
            ("/m/x/a_tool.cue", "package p\n"),
        ]);
        let units = fx.build("/m/x", PackageSelector::Unique);
        assert_eq!(units[0].build_files.len(), 1);
        assert!(units[0].imports.is_empty());
        assert_eq!(units[0].ignored_files.len(), 2);

        fx.options.tests = true;
        fx.dirs = DirCache::new();
        let units = fx.build("/m/x", PackageSelector::Unique);
        assert_eq!(units[0].build_files.len(), 2);
        assert_eq!(units[0].import_paths(), vec!["a.test/m/testing"]);
    }

    #[test]
    fn test_data_files_enabled() {
        let mut fx = Fixture::new(&[MANIFEST, ("/m/x/a.cue", "package p\n"), ("/m/x/d.yaml", "a: 1")]);
        fx.options.data_files = true;
        let units = fx.build("/m/x", PackageSelector::Unique);
        assert_eq!(names(&units[0].build_files), vec!["/m/x/a.cue", "/m/x/d.yaml"]);
        assert_eq!(units[0].syntax.len(), 1);
    }

    #[test]
    fn test_build_files_carry_source() {
        let mut fx = Fixture::new(&[MANIFEST, ("/m/x/a.cue", "package p\n\nx: 1\n"), ("/m/x/d.json", "{\"a\": 1}")]);
        fx.options.data_files = true;
        let units = fx.build("/m/x", PackageSelector::Unique);
        let sources: Vec<_> = units[0]
            .build_files
            .iter()
            .map(|f| f.source.as_deref().unwrap())
            .collect();
        assert_eq!(sources, vec![&b"package p\n\nx: 1\n"[..], &b"{\"a\": 1}"[..]]);

        let fx = Fixture::new(&[MANIFEST, ("/m/x/a.cue", "package p\n"), ("/m/x/b.cue", "package q\n")]);
        let units = fx.build("/m/x", PackageSelector::Named("p".to_string()));
        assert!(units[0].build_files[0].source.is_some());
        assert!(units[0].ignored_files.iter().all(|f| f.source.is_none()));
    }

    #[test]
    fn test_invalid_header() {
        let fx = Fixture::new(&[MANIFEST, ("/m/x/a.cue", "package p\n"), ("/m/x/b.cue", "package 1\n")]);
        let units = fx.build("/m/x", PackageSelector::Unique);
        assert_eq!(names(&units[0].invalid_files), vec!["/m/x/b.cue"]);
        assert!(units[0].invalid_files[0].error.is_some());
        assert!(matches!(
            units[0].err.as_ref().unwrap().first().unwrap(),
            Error::Parse { .. }
        ));
    }

    #[test]
    fn test_nested_module_stops_walk() {
        let fx = Fixture::new(&[
            MANIFEST,
            ("/m/root.cue", "package p\n"),
            ("/m/n/cue.mod/module.toml", "module = \"a.test/n\"\n"),
            ("/m/n/x/a.cue", "package p\n"),
        ]);
        let mut unit = BuildUnit::new("a.test/n/x", "/m/n/x");
        unit.root = Some(PathBuf::from("/m/n"));
        let units = build_dir(fx.ctx(), &fx.fs, unit, &PackageSelector::Unique);
        assert_eq!(names(&units[0].build_files), vec!["/m/n/x/a.cue"]);
    }

    #[test]
    fn test_explicit_files() {
        let fx = Fixture::new(&[
            ("/m/.a.cue", "x: 1\n"),
            ("/m/b.cue", "package p\n"),
            ("/m/c.json", "{}"),
        ]);
        let files = vec![
            PathBuf::from("/m/.a.cue"),
            PathBuf::from("/m/b.cue"),
            PathBuf::from("/m/c.json"),
        ];
        let unit = build_files(fx.ctx(), &fx.fs, Path::new("/m"), &files);
        assert!(unit.is_ok(), "{:?}", unit.err);
        assert!(unit.user);
        assert_eq!(unit.display_path, COMMAND_LINE_ARGUMENTS);
        assert_eq!(unit.package_name, "p");
        assert_eq!(names(&unit.build_files), vec!["/m/.a.cue", "/m/b.cue"]);
        assert_eq!(names(&unit.orphaned_files), vec!["/m/c.json"]);
    }

    #[test]
    fn test_explicit_missing_file() {
        let fx = Fixture::new(&[("/m/b.cue", "package p\n")]);
        let unit = build_files(fx.ctx(), &fx.fs, Path::new("/m"), &[PathBuf::from("/m/nope.cue")]);
        assert!(unit.err.as_ref().unwrap().first().unwrap().is_not_found());
    }

    #[test]
    fn test_ancestor_dirs() {
        assert_eq!(
            ancestor_dirs(Path::new("/m/a/b"), Some(Path::new("/m")), Path::new("/")),
            vec![PathBuf::from("/m/a"), PathBuf::from("/m")]
        );
        assert!(ancestor_dirs(Path::new("/m"), Some(Path::new("/m")), Path::new("/")).is_empty());
        assert_eq!(
            ancestor_dirs(Path::new("/w/a"), None, Path::new("/w")),
            vec![PathBuf::from("/w")]
        );
        assert!(ancestor_dirs(Path::new("/elsewhere"), None, Path::new("/w")).is_empty());
    }
}
