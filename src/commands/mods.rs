//! # Mods Command Implementation
//!
//! This module implements the `mods` subcommand, which prints the module
//! versions Minimal Version Selection picks for the main module, or with
//! `--cached`, every module version present in the module cache.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use cueload::config::Config;
use cueload::registry::{DirRegistry, FetchContext, Registry};
use cueload::resolver::Resolver;

use super::registry_root;

/// Print the module build list
#[derive(Args, Debug)]
pub struct ModsArgs {
    /// A directory inside the main module.
    ///
    /// If not provided, it defaults to the current working directory.
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// The module cache directory dependencies are read from.
    ///
    /// Can also be set with the `CUELOAD_REGISTRY` environment variable.
    #[arg(long, value_name = "DIR", env = "CUELOAD_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// List the module cache instead of the build list.
    #[arg(long)]
    pub cached: bool,
}

/// Execute the `mods` command.
pub fn execute(args: ModsArgs) -> Result<()> {
    let registry = DirRegistry::new(registry_root(args.registry));

    if args.cached {
        let modules = registry
            .index()
            .map_err(|e| anyhow::anyhow!("Failed to index {}: {}", registry.root().display(), e))?;
        if modules.is_empty() {
            println!("No modules in {}", registry.root().display());
        }
        for mv in modules {
            println!("{}", mv);
        }
        return Ok(());
    }

    let config = Config {
        dir: args.dir,
        ..Default::default()
    };
    let completed = config
        .complete()
        .map_err(|e| anyhow::anyhow!("Failed to load module configuration: {}", e))?;
    if completed.module.is_none() {
        anyhow::bail!(
            "no module found in {} or its parents",
            completed.dir.display()
        );
    }

    let registry: Arc<dyn Registry> = Arc::new(registry);
    let resolver = Resolver::new(&completed, Some(registry), FetchContext::new());
    let list = resolver
        .build_list()
        .map_err(|e| anyhow::anyhow!("Failed to compute build list: {}", e))?;
    for mv in list.versions() {
        println!("{}", mv);
    }
    Ok(())
}
