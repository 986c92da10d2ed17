//! Shared test utilities for integration and E2E tests.
//!
//! This module provides fixtures for loading trees held in memory and trees
//! written to a temporary directory.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let tree = MemTree::new("/w").module("example.com/app").file("/w/a.cue", "package a\n");
//!     let units = cueload::instances(&[".".to_string()], &tree.config());
//! }
//! ```

#![allow(dead_code)]

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cueload::config::Config;
use cueload::error::Result;
use cueload::filesystem::MemoryFS;
use cueload::syntax::{BasicParser, ParseMode, SourceParser, SyntaxFile};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::{args, CountingParser, MemTree, TestFixture};
}

/// Owned argument list.
pub fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// A source tree held in a [`MemoryFS`], loaded from `cwd`.
pub struct MemTree {
    fs: MemoryFS,
    cwd: PathBuf,
}

impl MemTree {
    pub fn new(cwd: &str) -> Self {
        Self {
            fs: MemoryFS::new(),
            cwd: PathBuf::from(cwd),
        }
    }

    /// Adds a module manifest at `cwd` declaring `module`.
    pub fn module(self, module: &str) -> Self {
        let manifest = format!("module = \"{}\"\n", module);
        let path = self.cwd.join("cue.mod/module.toml");
        self.file(&path.to_string_lossy(), &manifest)
    }

    pub fn file(mut self, path: &str, content: &str) -> Self {
        self.fs
            .add_file_string(path, content)
            .expect("Failed to add file");
        self
    }

    pub fn config(self) -> Config {
        Config {
            dir: Some(self.cwd),
            base_fs: Some(Arc::new(self.fs)),
            ..Default::default()
        }
    }
}

/// Counts the parses requested of [`BasicParser`].
#[derive(Debug, Default)]
pub struct CountingParser {
    pub full: AtomicUsize,
    pub imports_only: AtomicUsize,
}

impl CountingParser {
    pub fn full_parses(&self) -> usize {
        self.full.load(Ordering::SeqCst)
    }
}

impl SourceParser for CountingParser {
    fn parse(&self, filename: &Path, src: &[u8], mode: ParseMode) -> Result<SyntaxFile> {
        match mode {
            ParseMode::Full => self.full.fetch_add(1, Ordering::SeqCst),
            ParseMode::ImportsOnly => self.imports_only.fetch_add(1, Ordering::SeqCst),
        };
        BasicParser.parse(filename, src, mode)
    }
}

/// A temporary directory holding a source tree, for CLI tests.
///
/// # Example
///
/// ```rust,ignore
/// let fixture = TestFixture::new()
///     .with_module("example.com/app")
///     .with_file("a/a.cue", "package a\n");
///
/// fixture.command().arg("list").arg("./a").assert().success();
/// ```
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add a `cue.mod/module.toml` manifest with the given content.
    pub fn with_manifest(self, content: &str) -> Self {
        self.with_file("cue.mod/module.toml", content)
    }

    /// Add a manifest declaring `module` without dependencies.
    pub fn with_module(self, module: &str) -> Self {
        self.with_manifest(&format!("module = \"{}\"\n", module))
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a child path in the temp directory.
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// Create a command configured to run in this fixture's directory.
    ///
    /// The module cache points into the fixture so that the user's cache is
    /// never consulted.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("cueload");
        cmd.current_dir(self.path());
        cmd.env("CUELOAD_REGISTRY", self.path().join("registry"));
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_with_file() {
        let fixture = TestFixture::new().with_file("a/a.cue", "package a\n");
        assert!(fixture.path().join("a/a.cue").exists());
    }

    #[test]
    fn test_mem_tree_module() {
        let config = MemTree::new("/w").module("example.com/app").config();
        let done = config.complete().unwrap();
        assert_eq!(done.module_root, Some(PathBuf::from("/w")));
    }
}
