//! # Error Handling
//!
//! This module defines the centralized error handling mechanism for the
//! loader. It uses the `thiserror` library to create a comprehensive `Error`
//! enum covering every failure mode of a load, grouped by the stage that
//! produces it:
//!
//! - Filesystem errors (missing paths, invalid or colliding paths, I/O).
//! - Classification errors (malformed build attributes, parse failures).
//! - Package grouping errors (several packages in one directory, no usable
//!   files).
//! - Import resolution errors (bad import paths or qualifiers, missing or
//!   ambiguous packages, import cycles).
//! - Module resolution errors (manifest problems, registry failures,
//!   cancelled fetches).
//! - Tag injection errors (unknown or unused tags, undeclared tag variables).
//!
//! A build unit frequently accumulates more than one error. Rather than
//! having a single error value double as a list, [`Errors`] is an explicit
//! tagged variant: either `Single` or `List`, with a flattening
//! [`Errors::append`].

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::syntax::Position;

/// Main error type for loader operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A path does not exist in the filesystem (or overlay).
    #[error("{}: no such file or directory", .path.display())]
    NotFound { path: PathBuf },

    /// A path is malformed, or a virtual entry collides with a real one.
    #[error("invalid path {}: {message}", .path.display())]
    InvalidPath { path: PathBuf, message: String },

    /// A directory operation was attempted on something that is not a
    /// directory.
    #[error("{} is not a directory", .path.display())]
    NotADirectory { path: PathBuf },

    /// An I/O error, flattened to its message so that errors stay cloneable.
    #[error("I/O error on {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    /// An `@if` attribute whose expression could not be parsed.
    #[error("{}: invalid build attribute: {message}", .file.display())]
    InvalidBuildAttribute { file: PathBuf, message: String },

    /// More than one `@if` attribute precedes the package clause.
    #[error("{}: multiple @if attributes", .file.display())]
    MultipleIfAttributes { file: PathBuf },

    /// The source parser rejected a file.
    #[error("{pos}: {message}")]
    Parse { pos: Position, message: String },

    /// A directory holds files for two packages and no qualifier was given.
    #[error(
        "found packages {} ({}) and {} ({}) in {}",
        .packages[0], .files[0], .packages[1], .files[1], .dir.display()
    )]
    MultiplePackages {
        dir: PathBuf,
        packages: [String; 2],
        files: [String; 2],
    },

    /// A build unit ended up without a single qualifying source file.
    ///
    /// `excluded` lists every file that was excluded together with the
    /// reason; when it is empty the directory genuinely had no files.
    #[error("{}", no_usable_files_message(.display_path, .excluded))]
    NoUsableFiles {
        display_path: String,
        excluded: Vec<(String, String)>,
    },

    /// An import path that is syntactically invalid.
    #[error("invalid import path {path:?}: {message}")]
    InvalidImportPath { path: String, message: String },

    /// A package qualifier (explicit or implied) that cannot be used.
    #[error("invalid package qualifier in {path:?}: {message}")]
    InvalidQualifier { path: String, message: String },

    /// An import into the reserved standard namespace.
    #[error("{path:?} is a standard library import path and cannot be loaded from source")]
    StandardLibraryImport { path: String },

    /// A module providing the import path was found, but not the package.
    #[error("cannot find package {path:?}")]
    ImportNotFound { path: String },

    /// More than one module provides the import path.
    #[error(
        "ambiguous import: found package {path} in multiple locations:\n\t{}",
        .locations.join("\n\t")
    )]
    AmbiguousImport { path: String, locations: Vec<String> },

    /// A package resolved while the same path was already being resolved.
    #[error("import cycle not allowed: {path} imports itself")]
    ImportCycle { path: String },

    /// An error decorated with the import stack it occurred under.
    #[error("{0}")]
    Package(PackageError),

    /// A command-line pattern that matched no packages.
    #[error("{pattern:?} matched no packages")]
    NoMatch { pattern: String },

    /// No dependency of the main module covers the import path.
    #[error("no dependency found for import path {path:?}")]
    MissingDependency { path: String },

    /// A module manifest could not be read or parsed.
    #[error("invalid module file {}: {message}", .path.display())]
    Manifest { path: PathBuf, message: String },

    /// A version string that is not a valid semantic version.
    #[error("invalid version {version:?}: {message}")]
    InvalidVersion { version: String, message: String },

    /// The manifest declares a different module than the one requested.
    #[error("inconsistent modules: got {found:?}, want {want:?}")]
    InconsistentModule { found: String, want: String },

    /// The registry failed to provide a module or its requirements.
    #[error("cannot fetch {module}: {message}")]
    Registry { module: String, message: String },

    /// The fetch context was cancelled or its deadline expired.
    #[error("fetch of {module} cancelled: {reason}")]
    Cancelled { module: String, reason: String },

    /// A `key=value` tag whose key is not declared by any `@tag` attribute.
    #[error("no tag for {tag:?}")]
    UnknownTag { tag: String },

    /// A boolean tag referenced neither by an `@if` nor by a shorthand.
    #[error("tag {tag:?} not used in any file")]
    UnusedTag { tag: String },

    /// A `@tag(..., var=name)` referencing a variable no provider declares.
    #[error("tag variable '{name}' not found")]
    UndeclaredTagVar { name: String },

    /// A malformed `@tag` attribute or tag value.
    #[error("{message}")]
    InvalidTag { message: String },

    /// A tag variable provider failed.
    #[error("error getting tag variable '{name}': {message}")]
    TagVar { name: String, message: String },

    /// An error indicating that a mutex has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl Error {
    /// Converts an I/O error observed on `path`.
    ///
    /// Not-found errors become [`Error::NotFound`] so callers can match on
    /// them without inspecting messages.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound { path },
            _ => Error::Io {
                path,
                message: err.to_string(),
            },
        }
    }

    /// Reports whether this error means the path does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Strips any [`PackageError`] decoration.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Package(p) => p.error.root_cause(),
            other => other,
        }
    }

    /// Reports whether this error is an import cycle.
    pub fn is_import_cycle(&self) -> bool {
        matches!(self, Error::Package(p) if p.import_cycle)
    }
}

fn no_usable_files_message(display_path: &str, excluded: &[(String, String)]) -> String {
    if excluded.is_empty() {
        return format!("no .cue files in {}", display_path);
    }
    let files = excluded
        .iter()
        .map(|(file, reason)| format!("{}: {}", file, reason))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "build constraints exclude all .cue files in {} (ignored: {})",
        display_path, files
    )
}

/// An error together with the import stack under which it happened.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageError {
    /// Import paths from the package named on the command line down to the
    /// failing one.
    pub import_stack: Vec<String>,
    /// Position of the import that triggered the error, if known.
    pub pos: Option<Position>,
    /// The underlying error.
    pub error: Box<Error>,
    /// Import cycles carry their stack verbatim and are never re-stacked.
    pub import_cycle: bool,
}

impl fmt::Display for PackageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.import_cycle {
            return write!(
                f,
                "{}\npackage {}",
                self.error,
                self.import_stack.join("\n\timports ")
            );
        }
        if let Some(pos) = &self.pos {
            // The position is more useful than the stack.
            return write!(f, "{}: {}", pos, self.error);
        }
        if self.import_stack.is_empty() {
            return write!(f, "{}", self.error);
        }
        write!(
            f,
            "package {}: {}",
            self.import_stack.join("\n\timports "),
            self.error
        )
    }
}

/// One or more errors attached to a build unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Errors {
    Single(Error),
    List(Vec<Error>),
}

impl Errors {
    /// Appends `other`, flattening nested lists.
    pub fn append(self, other: Errors) -> Errors {
        let mut list = self.into_vec();
        list.extend(other.into_vec());
        if list.len() == 1 {
            Errors::Single(list.remove(0))
        } else {
            Errors::List(list)
        }
    }

    /// Appends `err` to an optional accumulator.
    pub fn append_opt(acc: Option<Errors>, err: impl Into<Errors>) -> Errors {
        match acc {
            Some(acc) => acc.append(err.into()),
            None => err.into(),
        }
    }

    /// The first (and for `Single`, only) error.
    pub fn first(&self) -> Option<&Error> {
        match self {
            Errors::Single(e) => Some(e),
            Errors::List(list) => list.first(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Errors::Single(_) => 1,
            Errors::List(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        let slice: &[Error] = match self {
            Errors::Single(e) => std::slice::from_ref(e),
            Errors::List(list) => list,
        };
        slice.iter()
    }

    pub fn into_vec(self) -> Vec<Error> {
        match self {
            Errors::Single(e) => vec![e],
            Errors::List(list) => list,
        }
    }
}

impl From<Error> for Errors {
    fn from(err: Error) -> Self {
        Errors::Single(err)
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for Errors {}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
