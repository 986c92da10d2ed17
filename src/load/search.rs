//! Expansion of command-line arguments into load targets

use std::path::{Path, PathBuf};

use crate::config::MOD_DIR;
use crate::error::{Error, Result};
use crate::filesystem::{absolute, FileSystem};
use crate::filetypes::is_file_arg;
use crate::module::{is_local_import, split_path_version, ImportPath};
use crate::overlay::{OverlayFs, WalkAction};
use crate::package::PackageSelector;
use crate::resolver::PackageLocation;
use crate::scanner::is_hidden;

use super::LoadContext;

/// Something to load, derived from one or more arguments.
#[derive(Debug)]
pub enum Target {
    Package {
        location: PackageLocation,
        display_path: String,
        /// Found by a `...` pattern; units without usable files are dropped.
        wildcard: bool,
    },
    /// Files named explicitly; they form a single unit.
    Files(Vec<PathBuf>),
    /// An argument that could not be turned into a target.
    Failed { display_path: String, error: Error },
}

/// Splits `pattern` into its path and an explicit qualifier of its last
/// element.
fn split_qualifier(pattern: &str) -> (&str, Option<&str>) {
    let last = pattern.rfind('/').map(|i| i + 1).unwrap_or(0);
    match pattern[last..].find(':') {
        Some(i) => (&pattern[..last + i], Some(&pattern[last + i + 1..])),
        None => (pattern, None),
    }
}

fn is_glob(arg: &str) -> bool {
    arg.contains(['*', '?', '['])
}

/// `.` or `./rel` for directories below `cwd`, the absolute path otherwise.
fn local_display_path(cwd: &Path, dir: &Path) -> String {
    match dir.strip_prefix(cwd) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => format!("./{}", rel.to_string_lossy().replace('\\', "/")),
        Err(_) => dir.to_string_lossy().into_owned(),
    }
}

/// Applies the configured package selection to a location whose pattern
/// carried no qualifier.
fn apply_package(location: &mut PackageLocation, package: &str) {
    if package.is_empty() {
        return;
    }
    location.selector = PackageSelector::parse(package);
    if let PackageSelector::Named(name) = &location.selector {
        let mut ip = ImportPath::parse(&location.import_path);
        ip.qualifier = name.clone();
        location.import_path = ip.canonical();
    }
}

/// Turns arguments into targets, in argument order.
///
/// Leading arguments are package patterns; once an argument names a file,
/// every following argument must name a file too.
pub fn expand(ctx: &LoadContext, args: &[String]) -> Vec<Target> {
    let split = args
        .iter()
        .position(|a| is_file_arg(a))
        .unwrap_or(args.len());
    let (patterns, files) = args.split_at(split);

    let mut targets = Vec::new();
    if let Some(bad) = files.iter().find(|f| !is_file_arg(f)) {
        targets.push(Target::Failed {
            display_path: bad.clone(),
            error: Error::InvalidPath {
                path: PathBuf::from(bad),
                message: "cannot mix files with packages".to_string(),
            },
        });
        return targets;
    }

    let default = [".".to_string()];
    let patterns = if patterns.is_empty() && files.is_empty() {
        &default[..]
    } else {
        patterns
    };
    for pattern in patterns {
        targets.extend(expand_pattern(ctx, pattern));
    }

    if !files.is_empty() {
        match expand_files(&ctx.completed.fs, &ctx.completed.dir, files) {
            Ok(paths) => targets.push(Target::Files(paths)),
            Err((display_path, error)) => targets.push(Target::Failed {
                display_path,
                error,
            }),
        }
    }
    targets
}

fn expand_files(
    fs: &OverlayFs,
    cwd: &Path,
    files: &[String],
) -> std::result::Result<Vec<PathBuf>, (String, Error)> {
    let mut paths = Vec::new();
    for arg in files {
        let path = absolute(cwd, Path::new(arg));
        if !is_glob(arg) {
            paths.push(path);
            continue;
        }
        let found = glob_files(fs, &path).map_err(|error| (arg.clone(), error))?;
        if found.is_empty() {
            return Err((
                arg.clone(),
                Error::NoMatch {
                    pattern: arg.clone(),
                },
            ));
        }
        paths.extend(found);
    }
    Ok(paths)
}

/// Files of `fs` matching the absolute glob `pattern`, in name order.
///
/// The walk starts at the longest directory prefix free of glob
/// metacharacters and does not descend below the pattern's depth unless the
/// pattern contains `**`.
fn glob_files(fs: &OverlayFs, pattern: &Path) -> Result<Vec<PathBuf>> {
    let text = pattern.to_string_lossy();
    let compiled = glob::Pattern::new(&text).map_err(|e| Error::InvalidPath {
        path: pattern.to_path_buf(),
        message: e.to_string(),
    })?;
    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let root: PathBuf = pattern
        .components()
        .take_while(|c| !is_glob(&c.as_os_str().to_string_lossy()))
        .collect();
    let depth = pattern.components().count();
    let recursive = text.contains("**");

    let mut found = Vec::new();
    let walked = fs.walk(&root, |path, info| {
        if info.is_dir {
            if !recursive && path.components().count() >= depth {
                return Ok(WalkAction::SkipDir);
            }
        } else if compiled.matches_path_with(path, options) {
            found.push(path.to_path_buf());
        }
        Ok(WalkAction::Continue)
    });
    match walked {
        Ok(()) => Ok(found),
        Err(e) if e.is_not_found() => Ok(found),
        Err(e) => Err(e),
    }
}

fn expand_pattern(ctx: &LoadContext, pattern: &str) -> Vec<Target> {
    let (path, qualifier) = split_qualifier(pattern);
    if path == "..." || path.ends_with("/...") {
        return match expand_wildcard(ctx, pattern, path, qualifier) {
            Ok(targets) => targets,
            Err(error) => vec![Target::Failed {
                display_path: pattern.to_string(),
                error,
            }],
        };
    }

    let cwd = &ctx.completed.dir;
    let from = ctx.resolver.main_location(cwd);
    match ctx.resolver.resolve(pattern, &from) {
        Ok(mut location) => {
            if qualifier.is_none() {
                apply_package(&mut location, &ctx.package);
            }
            let display_path = if location.local {
                local_display_path(cwd, &location.dir)
            } else {
                location.import_path.clone()
            };
            vec![Target::Package {
                location,
                display_path,
                wildcard: false,
            }]
        }
        Err(error) => vec![Target::Failed {
            display_path: pattern.to_string(),
            error,
        }],
    }
}

/// Root directory of a `.../...` pattern: local, or inside the main
/// module.
fn wildcard_root(ctx: &LoadContext, prefix: &str) -> Result<(PathBuf, bool)> {
    let cwd = &ctx.completed.dir;
    if prefix.is_empty() || prefix == "." || is_local_import(prefix) {
        return Ok((absolute(cwd, Path::new(prefix)), true));
    }
    if let (Some(module), Some(root)) = (&ctx.completed.module, &ctx.completed.module_root) {
        let base = split_path_version(module)
            .map(|(base, _)| base)
            .unwrap_or(module);
        if prefix == base {
            return Ok((root.clone(), false));
        }
        if let Some(rel) = prefix.strip_prefix(base).and_then(|r| r.strip_prefix('/')) {
            return Ok((root.join(rel), false));
        }
    }
    Err(Error::InvalidImportPath {
        path: format!("{}/...", prefix),
        message: "wildcards are only supported for local paths and the main module".to_string(),
    })
}

fn expand_wildcard(
    ctx: &LoadContext,
    pattern: &str,
    path: &str,
    qualifier: Option<&str>,
) -> Result<Vec<Target>> {
    let prefix = path.strip_suffix("...").unwrap_or(path).trim_end_matches('/');
    let (root, local) = wildcard_root(ctx, prefix)?;
    let fs = &ctx.completed.fs;

    let mut dirs = Vec::new();
    fs.walk(&root, |dir, info| {
        if !info.is_dir {
            return Ok(WalkAction::Continue);
        }
        if dir != root.as_path() {
            if is_hidden(&info.name) || info.name == MOD_DIR {
                return Ok(WalkAction::SkipDir);
            }
            if fs.stat(&dir.join(MOD_DIR)).is_ok() {
                log::debug!("skipping nested module {}", dir.display());
                return Ok(WalkAction::SkipDir);
            }
        }
        if ctx.dirs.has_cue_files(&**fs, &ctx.syntax, dir) {
            dirs.push(dir.to_path_buf());
        }
        Ok(WalkAction::Continue)
    })?;

    if dirs.is_empty() {
        return Err(Error::NoMatch {
            pattern: pattern.to_string(),
        });
    }

    let cwd = &ctx.completed.dir;
    let targets = dirs
        .into_iter()
        .map(|dir| {
            let mut location = ctx.resolver.main_location(&dir);
            location.local = local;
            match qualifier {
                Some(q) => {
                    location.selector = PackageSelector::parse(q);
                    if let PackageSelector::Named(name) = &location.selector {
                        let mut ip = ImportPath::parse(&location.import_path);
                        ip.qualifier = name.clone();
                        location.import_path = ip.canonical();
                    }
                }
                None => apply_package(&mut location, &ctx.package),
            }
            let display_path = if local {
                local_display_path(cwd, &dir)
            } else {
                location.import_path.clone()
            };
            Target::Package {
                location,
                display_path,
                wildcard: true,
            }
        })
        .collect();
    Ok(targets)
}
