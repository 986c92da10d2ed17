//! Overlay filesystem
//!
//! [`OverlayFs`] layers caller-supplied virtual files over any other
//! [`FileSystem`]. Virtual entries win over the base for `stat` and
//! `read_file`, every ancestor of a virtual file is synthesized as a
//! directory, and `read_dir` merges both layers sorted byte-wise by name.
//! All paths are canonicalized (absolute, cleaned) against the working
//! directory before lookup.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::filesystem::{absolute, clean_path, FileInfo, FileSystem};
use crate::syntax::SyntaxFile;

/// Content of a virtual file.
#[derive(Debug, Clone)]
pub enum OverlaySource {
    Bytes(Vec<u8>),
    /// A pre-parsed tree. The syntax cache returns it as-is; reading the
    /// file yields its rendering.
    Syntax(Arc<SyntaxFile>),
}

impl OverlaySource {
    fn bytes(&self) -> Vec<u8> {
        match self {
            OverlaySource::Bytes(b) => b.clone(),
            OverlaySource::Syntax(file) => file.render().into_bytes(),
        }
    }
}

impl From<&str> for OverlaySource {
    fn from(s: &str) -> Self {
        OverlaySource::Bytes(s.as_bytes().to_vec())
    }
}

#[derive(Debug, Clone)]
enum Entry {
    File(OverlaySource),
    Dir,
}

/// What a [`OverlayFs::walk`] visitor wants done next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAction {
    Continue,
    /// Do not descend into this directory.
    SkipDir,
}

#[derive(Debug)]
pub struct OverlayFs {
    base: Arc<dyn FileSystem>,
    cwd: PathBuf,
    entries: HashMap<PathBuf, Entry>,
    children: HashMap<PathBuf, BTreeSet<String>>,
    created: SystemTime,
}

impl OverlayFs {
    /// Builds the overlay.
    ///
    /// Overlay keys must be absolute, and no overlay file may be an
    /// ancestor of another.
    pub fn new(
        base: Arc<dyn FileSystem>,
        cwd: impl Into<PathBuf>,
        overlay: &HashMap<PathBuf, OverlaySource>,
    ) -> Result<Self> {
        let cwd = clean_path(&cwd.into());
        let mut entries = HashMap::new();
        let mut children: HashMap<PathBuf, BTreeSet<String>> = HashMap::new();

        let mut files: Vec<_> = overlay.iter().collect();
        files.sort_by(|a, b| a.0.cmp(b.0));
        for (path, source) in &files {
            if !path.is_absolute() {
                return Err(Error::InvalidPath {
                    path: path.to_path_buf(),
                    message: "overlay paths must be absolute".to_string(),
                });
            }
            entries.insert(clean_path(path), Entry::File((*source).clone()));
        }

        for (path, _) in files {
            let mut child = clean_path(path);
            while let Some(parent) = child.parent().map(Path::to_path_buf) {
                if let Some(Entry::File(_)) = entries.get(&parent) {
                    return Err(Error::InvalidPath {
                        path: parent,
                        message: format!(
                            "overlay file is an ancestor of overlay file {}",
                            child.display()
                        ),
                    });
                }
                if let Some(name) = child.file_name() {
                    children
                        .entry(parent.clone())
                        .or_default()
                        .insert(name.to_string_lossy().into_owned());
                }
                entries.entry(parent.clone()).or_insert(Entry::Dir);
                child = parent;
            }
        }

        log::debug!("overlay with {} files over {:?}", overlay.len(), base);
        Ok(Self {
            base,
            cwd,
            entries,
            children,
            created: SystemTime::now(),
        })
    }

    /// An overlay with no virtual files.
    pub fn passthrough(base: Arc<dyn FileSystem>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            base,
            cwd: clean_path(&cwd.into()),
            entries: HashMap::new(),
            children: HashMap::new(),
            created: SystemTime::now(),
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Canonical form of `path`: absolute against the working directory,
    /// without `.` or `..` elements.
    pub fn canonical(&self, path: &Path) -> PathBuf {
        absolute(&self.cwd, path)
    }

    pub fn is_dir(&self, path: &Path) -> bool {
        self.stat(path).map(|info| info.is_dir).unwrap_or(false)
    }

    fn name_of(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned())
    }

    fn collision(path: &Path, overlay_is_dir: bool) -> Error {
        let message = if overlay_is_dir {
            "overlay directory collides with a file"
        } else {
            "overlay file collides with a directory"
        };
        Error::InvalidPath {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    /// Depth-first pre-order walk starting at `root`, entries of each
    /// directory visited in name order.
    pub fn walk<F>(&self, root: &Path, mut visit: F) -> Result<()>
    where
        F: FnMut(&Path, &FileInfo) -> Result<WalkAction>,
    {
        let root = self.canonical(root);
        let info = self.stat(&root)?;
        let mut stack = vec![(root, info)];
        while let Some((path, info)) = stack.pop() {
            let action = visit(&path, &info)?;
            if !info.is_dir || action == WalkAction::SkipDir {
                continue;
            }
            let entries = self.read_dir(&path)?;
            for entry in entries.into_iter().rev() {
                let child = path.join(&entry.name);
                stack.push((child, entry));
            }
        }
        Ok(())
    }
}

impl FileSystem for OverlayFs {
    fn stat(&self, path: &Path) -> Result<FileInfo> {
        let path = self.canonical(path);
        match self.entries.get(&path) {
            Some(Entry::Dir) => {
                if let Ok(info) = self.base.stat(&path) {
                    if !info.is_dir {
                        return Err(Self::collision(&path, true));
                    }
                }
                Ok(FileInfo::dir(Self::name_of(&path), self.created))
            }
            Some(Entry::File(source)) => {
                if let Ok(info) = self.base.stat(&path) {
                    if info.is_dir {
                        return Err(Self::collision(&path, false));
                    }
                }
                Ok(FileInfo {
                    name: Self::name_of(&path),
                    is_dir: false,
                    size: source.bytes().len() as u64,
                    modified: self.created,
                })
            }
            None => self.base.stat(&path),
        }
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let path = self.canonical(path);
        match self.entries.get(&path) {
            Some(Entry::File(source)) => Ok(source.bytes()),
            Some(Entry::Dir) => Err(Error::InvalidPath {
                path,
                message: "is a directory".to_string(),
            }),
            None => self.base.read_file(&path),
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<FileInfo>> {
        let path = self.canonical(path);
        if let Some(Entry::File(_)) = self.entries.get(&path) {
            return Err(Error::NotADirectory { path });
        }
        let virtual_children = self.children.get(&path);

        let base_entries = match self.base.read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() && virtual_children.is_some() => Vec::new(),
            Err(Error::NotADirectory { .. }) if virtual_children.is_some() => {
                return Err(Self::collision(&path, true));
            }
            Err(e) => return Err(e),
        };

        let mut merged: BTreeMap<String, FileInfo> = base_entries
            .into_iter()
            .map(|info| (info.name.clone(), info))
            .collect();

        for name in virtual_children.into_iter().flatten() {
            let child = path.join(name);
            let overlay_is_dir = matches!(self.entries.get(&child), Some(Entry::Dir));
            if let Some(existing) = merged.get(name) {
                if existing.is_dir != overlay_is_dir {
                    return Err(Self::collision(&child, overlay_is_dir));
                }
            }
            let info = match self.entries.get(&child) {
                Some(Entry::File(source)) => FileInfo {
                    name: name.clone(),
                    is_dir: false,
                    size: source.bytes().len() as u64,
                    modified: self.created,
                },
                _ => FileInfo::dir(name.clone(), self.created),
            };
            merged.insert(name.clone(), info);
        }

        Ok(merged.into_values().collect())
    }

    fn syntax(&self, path: &Path) -> Option<Arc<SyntaxFile>> {
        match self.entries.get(&self.canonical(path)) {
            Some(Entry::File(OverlaySource::Syntax(file))) => Some(file.clone()),
            _ => None,
        }
    }
}
