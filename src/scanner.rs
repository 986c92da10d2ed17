//! Directory scanning and file classification
//!
//! A directory is listed once per load. Every `.cue` file that is not
//! hidden gets an imports-only parse through the syntax cache so that the
//! package builder can look at its attributes, package clause and imports
//! without paying for a full parse.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::SyntaxCache;
use crate::config::MOD_DIR;
use crate::error::Result;
use crate::filesystem::FileSystem;
use crate::filetypes::Encoding;
use crate::syntax::{ParseMode, SyntaxFile};

/// A classified file of a scanned directory.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Absolute path.
    pub path: PathBuf,
    pub name: String,
    pub encoding: Encoding,
    /// Imports-only tree, for `.cue` files that were parsed.
    pub header: Option<Result<Arc<SyntaxFile>>>,
}

impl ScannedFile {
    /// Classifies `path`, parsing its header when it is a `.cue` file.
    /// Hidden files are only parsed when `parse_hidden` is set.
    pub fn classify(
        fs: &dyn FileSystem,
        syntax: &SyntaxCache,
        path: &Path,
        parse_hidden: bool,
    ) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let encoding = Encoding::from_path(path);
        let header = if encoding == Encoding::Cue && (parse_hidden || !is_hidden(&name)) {
            Some(syntax.parse(fs, path, ParseMode::ImportsOnly))
        } else {
            None
        };
        Self {
            path: path.to_path_buf(),
            name,
            encoding,
            header,
        }
    }

    pub fn is_hidden(&self) -> bool {
        is_hidden(&self.name)
    }
}

/// Files starting with `.` or `_` are never part of a package unless named
/// explicitly.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

pub fn is_test_file(name: &str) -> bool {
    name.ends_with("_test.cue")
}

pub fn is_tool_file(name: &str) -> bool {
    name.ends_with("_tool.cue")
}

/// The result of scanning one directory.
#[derive(Debug, Clone)]
pub struct DirScan {
    pub dir: PathBuf,
    /// Regular files in byte-wise name order.
    pub files: Vec<ScannedFile>,
    /// Subdirectory names in byte-wise order.
    pub subdirs: Vec<String>,
    /// The directory holds a `cue.mod` entry.
    pub is_module_root: bool,
}

/// Lists and classifies `dir`.
pub fn scan_dir(fs: &dyn FileSystem, syntax: &SyntaxCache, dir: &Path) -> Result<DirScan> {
    let entries = fs.read_dir(dir)?;
    let mut scan = DirScan {
        dir: dir.to_path_buf(),
        files: Vec::new(),
        subdirs: Vec::new(),
        is_module_root: false,
    };
    for entry in entries {
        if entry.name == MOD_DIR {
            scan.is_module_root = true;
        }
        if entry.is_dir {
            scan.subdirs.push(entry.name);
            continue;
        }
        scan.files
            .push(ScannedFile::classify(fs, syntax, &dir.join(&entry.name), false));
    }
    log::trace!(
        "scanned {}: {} files, {} subdirectories",
        dir.display(),
        scan.files.len(),
        scan.subdirs.len()
    );
    Ok(scan)
}
