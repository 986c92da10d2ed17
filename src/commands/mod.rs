//! # CLI Command Implementations
//!
//! Each subcommand of the `cueload` tool lives in its own file and
//! contains:
//! - An `Args` struct that defines the command-specific arguments and
//!   options, derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and calls into the
//!   `cueload` library.

pub mod list;
pub mod mods;

use std::path::PathBuf;

/// Module cache directory: the `--registry` value, or `cueload/mod` under
/// the system cache directory.
pub fn registry_root(arg: Option<PathBuf>) -> PathBuf {
    arg.unwrap_or_else(|| {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("cueload")
            .join("mod")
    })
}
