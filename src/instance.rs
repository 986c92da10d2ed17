//! Build units and source files
//!
//! A [`BuildUnit`] is created empty by the loader, filled by the package
//! builder, finalized once every ancestor directory has been scanned, and
//! never mutated after it is returned to the caller.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Errors};
use crate::filetypes::Encoding;
use crate::syntax::{Position, SyntaxFile};

/// Why a file does not take part in a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExcludeReason {
    /// The file name starts with `.` or `_`.
    Hidden,
    ConstraintMismatch { expr: String },
    IgnoreAttribute,
    /// The file has no package clause and anonymous files are not allowed.
    AnonymousPackage,
    WrongPackage { found: String, want: String },
    TestFile,
    ToolFile,
    /// A data file while data files are disabled.
    DataFile,
}

impl fmt::Display for ExcludeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExcludeReason::Hidden => write!(f, "hidden file"),
            ExcludeReason::ConstraintMismatch { expr } => write!(f, "@if({}) did not match", expr),
            ExcludeReason::IgnoreAttribute => write!(f, "@ignore() attribute found"),
            ExcludeReason::AnonymousPackage => write!(f, "no package name"),
            ExcludeReason::WrongPackage { found, want } => {
                write!(f, "package is {}, want {}", found, want)
            }
            ExcludeReason::TestFile => write!(f, "_test.cue files excluded in non-test mode"),
            ExcludeReason::ToolFile => write!(f, "_tool.cue files excluded in non-tool mode"),
            ExcludeReason::DataFile => write!(f, "data files not enabled"),
        }
    }
}

/// A file considered for a build unit.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    /// Absolute path.
    pub filename: PathBuf,
    pub encoding: Encoding,
    /// Source bytes, when already read.
    pub source: Option<Arc<[u8]>>,
    pub exclude_reason: Option<ExcludeReason>,
    /// Set for files filed as invalid.
    pub error: Option<Error>,
}

impl SourceFile {
    pub fn new(filename: impl Into<PathBuf>, encoding: Encoding) -> Self {
        Self {
            filename: filename.into(),
            encoding,
            source: None,
            exclude_reason: None,
            error: None,
        }
    }

    pub fn excluded(mut self, reason: ExcludeReason) -> Self {
        self.exclude_reason = Some(reason);
        self
    }

    /// Base name of the file.
    pub fn name(&self) -> String {
        self.filename
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A package ready for evaluation.
#[derive(Debug, Clone, Default)]
pub struct BuildUnit {
    /// Canonical import path; includes a `:pkg` qualifier for sibling units
    /// spawned in all-packages mode.
    pub import_path: String,
    /// Path as the user should see it: relative to the working directory
    /// for local packages.
    pub display_path: String,
    pub package_name: String,
    /// Owning module path, without a major version suffix.
    pub module: Option<String>,
    pub root: Option<PathBuf>,
    /// Absolute directory of the package.
    pub dir: PathBuf,

    pub build_files: Vec<SourceFile>,
    pub ignored_files: Vec<SourceFile>,
    pub orphaned_files: Vec<SourceFile>,
    pub invalid_files: Vec<SourceFile>,
    pub unknown_files: Vec<SourceFile>,

    /// Direct imports with every position each is imported from.
    pub imports: BTreeMap<String, Vec<Position>>,
    /// Build tags referenced by `@if` attributes of any considered file.
    pub all_tags: Vec<String>,
    /// Fully parsed build files, in build file order.
    pub syntax: Vec<Arc<SyntaxFile>>,
    /// Resolved dependencies, sorted by import path.
    pub dependencies: Vec<Arc<BuildUnit>>,

    pub err: Option<Errors>,
    /// Set when a dependency failed to load.
    pub incomplete: bool,
    /// Files were named directly on the command line.
    pub user: bool,
    /// The unit was named by a local (`./`) pattern.
    pub local: bool,
}

impl BuildUnit {
    pub fn new(import_path: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            import_path: import_path.into(),
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Records an error; the first recorded error stays first.
    pub fn report_error(&mut self, err: impl Into<Errors>) {
        self.err = Some(Errors::append_opt(self.err.take(), err));
    }

    pub fn is_ok(&self) -> bool {
        self.err.is_none()
    }

    pub fn add_tag(&mut self, tag: &str) {
        if !self.all_tags.iter().any(|t| t == tag) {
            self.all_tags.push(tag.to_string());
        }
    }

    /// Sorted, deduplicated import paths.
    pub fn import_paths(&self) -> Vec<&str> {
        self.imports.keys().map(String::as_str).collect()
    }

    /// Looks up a resolved dependency by import path.
    pub fn dependency(&self, import_path: &str) -> Option<&Arc<BuildUnit>> {
        self.dependencies
            .iter()
            .find(|d| d.import_path == import_path)
    }
}
