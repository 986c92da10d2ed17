//! Module paths, versions and import path syntax
//!
//! Module paths carry a major version suffix (`example.com/foo@v0`). A
//! [`ModuleVersion`] pairs such a path with a concrete semantic version; the
//! main module has no version and orders after every real version.

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::filesystem::FileSystem;

/// A module at a specific version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleVersion {
    /// Module path including its major version suffix.
    pub path: String,
    /// `None` for the main module.
    pub version: Option<String>,
}

impl ModuleVersion {
    /// A dependency version; the version must be valid semver whose major
    /// matches the path's major suffix.
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let version = version.into();
        parse_version(&version)?;
        if let Some((_, path_major)) = split_path_version(&path) {
            let got = major(&version).to_string();
            if got != path_major {
                return Err(Error::InvalidVersion {
                    version,
                    message: format!("should be {}, not {}", path_major, got),
                });
            }
        }
        Ok(Self {
            path,
            version: Some(version),
        })
    }

    pub fn main(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            version: None,
        }
    }

    /// Module path without the major version suffix.
    pub fn base_path(&self) -> &str {
        split_path_version(&self.path)
            .map(|(base, _)| base)
            .unwrap_or(&self.path)
    }

    pub fn is_main(&self) -> bool {
        self.version.is_none()
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{}", self.base_path(), v),
            None => write!(f, "{}", self.path),
        }
    }
}

/// Parses a `v`-prefixed semantic version.
pub fn parse_version(version: &str) -> Result<semver::Version> {
    let trimmed = version.strip_prefix('v').ok_or_else(|| Error::InvalidVersion {
        version: version.to_string(),
        message: "missing leading v".to_string(),
    })?;
    semver::Version::parse(trimmed).map_err(|e| Error::InvalidVersion {
        version: version.to_string(),
        message: e.to_string(),
    })
}

/// Orders versions with `None` (the main module) above everything else.
/// Unparseable versions order below valid ones.
pub fn compare_versions(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (parse_version(a), parse_version(b)) {
            (Ok(va), Ok(vb)) => va.cmp(&vb),
            (Ok(_), Err(_)) => Ordering::Greater,
            (Err(_), Ok(_)) => Ordering::Less,
            (Err(_), Err(_)) => a.cmp(b),
        },
    }
}

/// The major version prefix of a version: `v1.2.3` → `v1`.
pub fn major(version: &str) -> &str {
    match version.find('.') {
        Some(i) => &version[..i],
        None => version,
    }
}

/// Splits `base@vN` into its base path and major version.
pub fn split_path_version(path: &str) -> Option<(&str, &str)> {
    let at = path.rfind('@')?;
    let (base, version) = (&path[..at], &path[at + 1..]);
    if version.contains('/') || !version.starts_with('v') {
        return None;
    }
    Some((base, version))
}

/// Reports whether `path` is relative to the importing directory.
pub fn is_local_import(path: &str) -> bool {
    path == "."
        || path == ".."
        || path.starts_with("./")
        || path.starts_with("../")
}

/// Reports whether `path` belongs to the standard library namespace: its
/// first element has no dot.
pub fn is_std_path(path: &str) -> bool {
    if is_local_import(path) || path.starts_with('/') {
        return false;
    }
    let first = path.split('/').next().unwrap_or(path);
    let first = first.split(['@', ':']).next().unwrap_or(first);
    !first.contains('.')
}

/// The components of an import path `base[@version][:qualifier]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportPath {
    /// Path without version or qualifier.
    pub path: String,
    /// Major version, or empty.
    pub version: String,
    /// Package qualifier, explicit or implied from the last element.
    pub qualifier: String,
    pub explicit_qualifier: bool,
}

impl ImportPath {
    /// Splits an import path into its components without validating them.
    pub fn parse(raw: &str) -> Self {
        let last_slash = raw.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (rest, qualifier) = match raw[last_slash..].find(':') {
            Some(i) => (&raw[..last_slash + i], Some(&raw[last_slash + i + 1..])),
            None => (raw, None),
        };
        let (path, version) = match rest[last_slash.min(rest.len())..].find('@') {
            Some(i) => {
                let at = last_slash + i;
                (&rest[..at], &rest[at + 1..])
            }
            None => (rest, ""),
        };
        let implied = path.rsplit('/').next().unwrap_or(path);
        Self {
            path: path.to_string(),
            version: version.to_string(),
            qualifier: qualifier.unwrap_or(implied).to_string(),
            explicit_qualifier: qualifier.is_some(),
        }
    }

    /// The path with version, without qualifier.
    pub fn unqualified(&self) -> String {
        if self.version.is_empty() {
            self.path.clone()
        } else {
            format!("{}@{}", self.path, self.version)
        }
    }

    /// The shortest form: the qualifier is dropped when it equals the last
    /// path element.
    pub fn canonical(&self) -> String {
        let implied = self.path.rsplit('/').next().unwrap_or(&self.path);
        if self.qualifier.is_empty() || self.qualifier == implied {
            self.unqualified()
        } else {
            format!("{}:{}", self.unqualified(), self.qualifier)
        }
    }
}

impl fmt::Display for ImportPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

fn import_char_ok(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~' | '+')
}

/// Validates a non-local import path.
pub fn check_import_path(raw: &str) -> Result<()> {
    let invalid = |message: String| Error::InvalidImportPath {
        path: raw.to_string(),
        message,
    };
    let parts = ImportPath::parse(raw);
    if !parts.version.is_empty() && major(&parts.version) != parts.version {
        return Err(invalid(
            "import paths can only contain a major version specifier".to_string(),
        ));
    }
    let path = parts.path.as_str();
    if path.is_empty() {
        return Err(invalid("empty string".to_string()));
    }
    if path.starts_with('-') {
        return Err(invalid("leading dash".to_string()));
    }
    if path.starts_with('/') {
        return Err(invalid("leading slash".to_string()));
    }
    if path.ends_with('/') {
        return Err(invalid("trailing slash".to_string()));
    }
    for elem in path.split('/') {
        if elem.is_empty() {
            return Err(invalid("double slash".to_string()));
        }
        if elem.chars().all(|c| c == '.') {
            return Err(invalid(format!("invalid path element {:?}", elem)));
        }
        if elem.ends_with('.') {
            return Err(invalid("trailing dot in path element".to_string()));
        }
        if let Some(c) = elem.chars().find(|c| !import_char_ok(*c)) {
            return Err(invalid(format!("invalid char {:?}", c)));
        }
    }
    Ok(())
}

/// Lexically cleans a slash-separated import path.
pub fn clean_import(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();
    for elem in path.split('/') {
        match elem {
            "" | "." => {}
            ".." => match out.last() {
                Some(&last) if last != ".." => {
                    out.pop();
                }
                _ if rooted => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    let joined = out.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Where a module's files live.
#[derive(Debug, Clone)]
pub struct SourceLoc {
    pub fs: Arc<dyn FileSystem>,
    /// Module root within `fs`.
    pub dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_version() {
        let mv = ModuleVersion::new("example.com/lib@v0", "v0.2.1").unwrap();
        assert_eq!(mv.base_path(), "example.com/lib");
        assert_eq!(mv.to_string(), "example.com/lib@v0.2.1");
        assert!(!mv.is_main());

        let err = ModuleVersion::new("example.com/lib@v1", "v0.2.1").unwrap_err();
        assert!(err.to_string().contains("should be v1, not v0"));
        assert!(ModuleVersion::new("example.com/lib@v0", "0.1.0").is_err());

        let main = ModuleVersion::main("example.com/app@v0");
        assert!(main.is_main());
        assert_eq!(main.to_string(), "example.com/app@v0");
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions(None, Some("v9.0.0")), Ordering::Greater);
        assert_eq!(compare_versions(Some("v0.1.0"), None), Ordering::Less);
        assert_eq!(compare_versions(None, None), Ordering::Equal);
        assert_eq!(
            compare_versions(Some("v0.10.0"), Some("v0.9.0")),
            Ordering::Greater
        );
        assert_eq!(
            compare_versions(Some("v1.0.0-rc.1"), Some("v1.0.0")),
            Ordering::Less
        );
    }

    #[test]
    fn test_split_and_major() {
        assert_eq!(
            split_path_version("example.com/a@v1"),
            Some(("example.com/a", "v1"))
        );
        assert_eq!(split_path_version("example.com/a"), None);
        assert_eq!(major("v1.2.3"), "v1");
        assert_eq!(major("v2"), "v2");
    }

    #[test]
    fn test_import_path_parse() {
        let ip = ImportPath::parse("example.com/foo/bar@v1:baz");
        assert_eq!(ip.path, "example.com/foo/bar");
        assert_eq!(ip.version, "v1");
        assert_eq!(ip.qualifier, "baz");
        assert!(ip.explicit_qualifier);
        assert_eq!(ip.canonical(), "example.com/foo/bar@v1:baz");

        let ip = ImportPath::parse("example.com/foo/bar:bar");
        assert_eq!(ip.canonical(), "example.com/foo/bar");

        let ip = ImportPath::parse("example.com/foo-bar");
        assert_eq!(ip.qualifier, "foo-bar");
        assert!(!ip.explicit_qualifier);
        assert_eq!(ip.version, "");
    }

    #[test]
    fn test_local_and_std() {
        assert!(is_local_import("."));
        assert!(is_local_import("../x"));
        assert!(!is_local_import(".x"));
        assert!(is_std_path("strings"));
        assert!(is_std_path("encoding/json"));
        assert!(!is_std_path("example.com/x"));
        assert!(!is_std_path("./x"));
    }

    #[test]
    fn test_check_import_path() {
        assert!(check_import_path("example.com/foo@v1:bar").is_ok());
        assert!(check_import_path("example.com/foo@v1.2.0").is_err());
        assert!(check_import_path("example.com//foo").is_err());
        assert!(check_import_path("example.com/foo bar").is_err());
        assert!(check_import_path("example.com/foo.").is_err());
    }

    #[test]
    fn test_clean_import() {
        assert_eq!(clean_import("a/./b/../c"), "a/c");
        assert_eq!(clean_import("./a"), "a");
        assert_eq!(clean_import("../a"), "../a");
        assert_eq!(clean_import("/a/../.."), "/");
        assert_eq!(clean_import("a/.."), ".");
    }
}
