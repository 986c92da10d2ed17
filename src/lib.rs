//! # cueload
//!
//! This library turns command-line patterns (directories, import paths or
//! explicit files) into build units for `.cue` configuration trees: it
//! discovers source files, groups them into packages, resolves imports
//! across packages and modules, and injects command-line tags. It is used
//! by the `cueload` command-line tool but is meant to be embedded by any
//! tool that evaluates configurations.
//!
//! ## Quick Example
//!
//! ```
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use cueload::config::Config;
//! use cueload::filesystem::MemoryFS;
//!
//! let mut fs = MemoryFS::new();
//! fs.add_file_string("/work/cue.mod/module.toml", "module = \"example.com/app\"\n").unwrap();
//! fs.add_file_string("/work/hello/hello.cue", "package hello\n\nmsg: \"hi\"\n").unwrap();
//!
//! let config = Config {
//!     dir: Some(PathBuf::from("/work")),
//!     base_fs: Some(Arc::new(fs)),
//!     ..Default::default()
//! };
//! let units = cueload::instances(&["./hello".to_string()], &config);
//! assert_eq!(units.len(), 1);
//! assert_eq!(units[0].import_path, "example.com/app/hello");
//! assert_eq!(units[0].package_name, "hello");
//! assert!(units[0].is_ok());
//! ```
//!
//! ## Core Concepts
//!
//! - **Filesystems (`filesystem`, `overlay`)**: every read goes through the
//!   `FileSystem` trait. The overlay layers caller-supplied files over a
//!   base filesystem without touching disk.
//! - **Syntax (`syntax`, `cache`)**: the `SourceParser` collaborator turns
//!   bytes into a `SyntaxFile`; the syntax cache parses each file at most
//!   once per mode and load.
//! - **Packages (`scanner`, `buildattr`, `package`, `instance`)**: a
//!   directory is scanned once, its files classified and grouped with the
//!   files of its ancestors into `BuildUnit`s.
//! - **Modules (`module`, `config`, `registry`, `mvs`, `resolver`)**: the
//!   main module's manifest names its dependencies; Minimal Version
//!   Selection picks one version per module, and the resolver maps import
//!   paths to directories in the main module or in fetched modules.
//! - **Tags (`tags`)**: `-t` values select files through `@if` attributes
//!   and are injected into fields carrying `@tag` attributes.
//!
//! ## Execution Flow
//!
//! [`instances`] executes the following steps:
//!
//! 1.  **Configuration**: complete the `Config`, locate the module root and
//!     parse its manifest.
//! 2.  **Expansion**: turn arguments into targets (directories, wildcards,
//!     import paths, explicit files).
//! 3.  **Loading**: build every target and follow imports depth first,
//!     detecting cycles with the import stack.
//! 4.  **Tag injection**: inject `-t` values and tag variables into all
//!     loaded units.
//! 5.  **Freezing**: link units to their dependencies and hand them out.

pub mod buildattr;
pub mod cache;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod filetypes;
pub mod instance;
pub mod load;
pub mod module;
pub mod mvs;
pub mod overlay;
pub mod package;
pub mod registry;
pub mod resolver;
pub mod scanner;
pub mod syntax;
pub mod tags;

pub use load::instances;

#[cfg(test)]
mod mvs_proptest;
