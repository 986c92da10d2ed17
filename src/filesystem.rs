//! Filesystem capability and its host and in-memory backends
//!
//! Everything the loader reads goes through the [`FileSystem`] trait so that
//! the same scanning code works against the real disk ([`HostFs`]), an
//! in-memory tree ([`MemoryFS`], used for registry module contents and
//! tests) and the overlay layer in [`crate::overlay`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;


use crate::error::{Error, Result};
use crate::syntax::SyntaxFile;

/// Metadata for a single directory entry
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    /// Final path element
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: SystemTime,
}

impl FileInfo {
    pub fn dir(name: impl Into<String>, modified: SystemTime) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            size: 0,
            modified,
        }
    }
}

/// Read-only filesystem capability used by the loader.
pub trait FileSystem: Send + Sync + fmt::Debug {
    fn stat(&self, path: &Path) -> Result<FileInfo>;

    /// Reads the full contents of a file.
    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Lists a directory, sorted by name.
    fn read_dir(&self, path: &Path) -> Result<Vec<FileInfo>>;

    /// Returns a pre-parsed syntax tree for `path`, if this filesystem
    /// holds one.
    fn syntax(&self, _path: &Path) -> Option<Arc<SyntaxFile>> {
        None
    }
}

/// Lexically cleans a path: removes `.` elements, resolves `..` against
/// preceding elements and drops redundant separators.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(comp),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Makes `path` absolute against `cwd` and cleans it.
pub fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        clean_path(path)
    } else {
        clean_path(&cwd.join(path))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// The host filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFs;

impl HostFs {
    fn info(path: &Path, meta: &std::fs::Metadata) -> FileInfo {
        FileInfo {
            name: file_name(path),
            is_dir: meta.is_dir(),
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }
}

impl FileSystem for HostFs {
    fn stat(&self, path: &Path) -> Result<FileInfo> {
        let meta = std::fs::metadata(path).map_err(|e| Error::io(path, e))?;
        Ok(Self::info(path, &meta))
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| Error::io(path, e))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<FileInfo>> {
        let meta = std::fs::metadata(path).map_err(|e| Error::io(path, e))?;
        if !meta.is_dir() {
            return Err(Error::NotADirectory {
                path: path.to_path_buf(),
            });
        }
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path).map_err(|e| Error::io(path, e))? {
            let entry = entry.map_err(|e| Error::io(path, e))?;
            let entry_path = entry.path();
            // Follow symlinks so linked directories are scanned too.
            let meta = match std::fs::metadata(&entry_path) {
                Ok(meta) => meta,
                Err(e) => {
                    log::debug!("skipping unreadable entry {}: {}", entry_path.display(), e);
                    continue;
                }
            };
            entries.push(Self::info(&entry_path, &meta));
        }
        entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        Ok(entries)
    }
}

/// Represents a file with content and metadata
#[derive(Debug, Clone)]
pub struct File {
    /// File content as bytes
    pub content: Vec<u8>,
    /// File modification time
    pub modified_time: SystemTime,
}

impl File {
    /// Create a new file with content
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            content,
            modified_time: SystemTime::now(),
        }
    }

    /// Create a new file from string content
    pub fn from_string(content: &str) -> Self {
        Self::new(content.as_bytes().to_vec())
    }

    /// Get file size in bytes
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// In-memory filesystem.
///
/// Paths are stored relative to the filesystem root: `/a/b.cue` and
/// `a/b.cue` name the same file. Directories are implied by the files
/// beneath them.
#[derive(Debug, Clone, Default)]
pub struct MemoryFS {
    files: BTreeMap<PathBuf, File>,
}

impl MemoryFS {
    /// Create a new empty filesystem
    pub fn new() -> Self {
        Self::default()
    }

    fn key(path: &Path) -> PathBuf {
        let cleaned = clean_path(path);
        let rel: PathBuf = cleaned
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        rel
    }

    /// Add or update a file
    fn add_file<P: AsRef<Path>>(&mut self, path: P, file: File) -> Result<()> {
        let key = Self::key(path.as_ref());
        if key.as_os_str().is_empty() {
            return Err(Error::InvalidPath {
                path: path.as_ref().to_path_buf(),
                message: "empty file name".to_string(),
            });
        }
        if self.is_dir(&key) {
            return Err(Error::InvalidPath {
                path: path.as_ref().to_path_buf(),
                message: "a directory exists at this path".to_string(),
            });
        }
        self.files.insert(key, file);
        Ok(())
    }

    /// Add a file with string content
    pub fn add_file_string<P: AsRef<Path>>(&mut self, path: P, content: &str) -> Result<()> {
        self.add_file(path, File::from_string(content))
    }

    fn is_dir(&self, key: &Path) -> bool {
        if key.as_os_str().is_empty() {
            return true;
        }
        self.files
            .keys()
            .any(|p| p != key && p.starts_with(key))
    }
}

impl FileSystem for MemoryFS {
    fn stat(&self, path: &Path) -> Result<FileInfo> {
        let key = Self::key(path);
        if let Some(file) = self.files.get(&key) {
            return Ok(FileInfo {
                name: file_name(&key),
                is_dir: false,
                size: file.size() as u64,
                modified: file.modified_time,
            });
        }
        if self.is_dir(&key) {
            return Ok(FileInfo::dir(file_name(path), SystemTime::UNIX_EPOCH));
        }
        Err(Error::NotFound {
            path: path.to_path_buf(),
        })
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        match self.files.get(&Self::key(path)) {
            Some(file) => Ok(file.content.clone()),
            None if self.is_dir(&Self::key(path)) => Err(Error::InvalidPath {
                path: path.to_path_buf(),
                message: "is a directory".to_string(),
            }),
            None => Err(Error::NotFound {
                path: path.to_path_buf(),
            }),
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<FileInfo>> {
        let key = Self::key(path);
        if self.files.contains_key(&key) {
            return Err(Error::NotADirectory {
                path: path.to_path_buf(),
            });
        }
        let mut entries: BTreeMap<String, FileInfo> = BTreeMap::new();
        for (file_path, file) in &self.files {
            let rest = match file_path.strip_prefix(&key) {
                Ok(rest) => rest,
                Err(_) => continue,
            };
            let mut comps = rest.components();
            let first = match comps.next() {
                Some(c) => c.as_os_str().to_string_lossy().into_owned(),
                None => continue,
            };
            let info = if comps.next().is_some() {
                FileInfo::dir(first.clone(), SystemTime::UNIX_EPOCH)
            } else {
                FileInfo {
                    name: first.clone(),
                    is_dir: false,
                    size: file.size() as u64,
                    modified: file.modified_time,
                }
            };
            entries.entry(first).or_insert(info);
        }
        if entries.is_empty() && !key.as_os_str().is_empty() {
            return Err(Error::NotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(entries.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(clean_path(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(clean_path(Path::new("a/..")), PathBuf::from("."));
        assert_eq!(clean_path(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(
            absolute(Path::new("/work"), Path::new("sub/../x.cue")),
            PathBuf::from("/work/x.cue")
        );
    }

    #[test]
    fn test_memory_fs_basic() {
        let mut fs = MemoryFS::new();
        fs.add_file_string("/pkg/a.cue", "package a").unwrap();
        fs.add_file_string("pkg/sub/b.cue", "package b").unwrap();

        assert_eq!(fs.read_file(Path::new("/pkg/a.cue")).unwrap(), b"package a");
        assert_eq!(fs.read_file(Path::new("pkg/sub/b.cue")).unwrap(), b"package b");
        assert!(fs.stat(Path::new("/pkg/sub")).unwrap().is_dir);
        assert!(fs.stat(Path::new("/nope")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_memory_fs_read_dir_sorted_with_implied_dirs() {
        let mut fs = MemoryFS::new();
        fs.add_file_string("d/z.cue", "").unwrap();
        fs.add_file_string("d/a.cue", "").unwrap();
        fs.add_file_string("d/m/x.cue", "").unwrap();

        let names: Vec<_> = fs
            .read_dir(Path::new("/d"))
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.is_dir))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a.cue".to_string(), false),
                ("m".to_string(), true),
                ("z.cue".to_string(), false)
            ]
        );
        assert!(matches!(
            fs.read_dir(Path::new("d/a.cue")),
            Err(Error::NotADirectory { .. })
        ));
        assert!(fs.read_dir(Path::new("/")).is_ok());
    }

    #[test]
    fn test_memory_fs_rejects_file_over_directory() {
        let mut fs = MemoryFS::new();
        fs.add_file_string("d/a.cue", "").unwrap();
        assert!(fs.add_file_string("d", "").is_err());
    }

    #[test]
    fn test_host_fs_read_dir() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("b.cue"), "package b").unwrap();
        std::fs::write(temp.path().join("a.cue"), "package a").unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();

        let entries = HostFs.read_dir(temp.path()).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.cue", "b.cue", "sub"]);
        assert!(entries[2].is_dir);
        assert_eq!(
            HostFs.read_file(&temp.path().join("a.cue")).unwrap(),
            b"package a"
        );
        assert!(HostFs
            .read_file(&temp.path().join("missing.cue"))
            .unwrap_err()
            .is_not_found());
    }
}
