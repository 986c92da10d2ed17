//! # Loader
//!
//! Turns command-line arguments into fully populated build units.
//!
//! - `search` expands arguments into load targets: local directories,
//!   `./dir/...` wildcards, import paths and explicit files.
//! - `orchestrator` builds every target, resolves imports recursively with
//!   cycle detection, and injects tags once everything is loaded.
//! - `stack` holds the import stack used for cycle detection and error
//!   context.
//!
//! All caches of a load live in its [`LoadContext`]; nothing is shared
//! between two calls to [`instances`].

pub mod orchestrator;
pub mod search;
pub mod stack;

use std::collections::HashMap;
use std::sync::Arc;

pub use orchestrator::instances;

use crate::cache::{DirCache, SyntaxCache};
use crate::config::{Completed, Config};
use crate::error::Result;
use crate::package::{BuildContext, BuildOptions};
use crate::resolver::Resolver;
use crate::syntax::{BasicParser, SourceParser};
use crate::tags::{default_tag_vars, TagVar, Tagger};

/// Per-load state.
#[derive(Debug)]
pub struct LoadContext {
    pub completed: Completed,
    pub syntax: SyntaxCache,
    pub dirs: DirCache,
    pub tagger: Tagger,
    pub options: BuildOptions,
    pub resolver: Resolver,
    /// Package selection from the configuration.
    pub package: String,
    pub tags: Vec<String>,
    pub tag_vars: HashMap<String, TagVar>,
}

impl LoadContext {
    pub fn new(config: &Config) -> Result<Self> {
        let completed = config.complete()?;
        let parser: Arc<dyn SourceParser> = config
            .parser
            .clone()
            .unwrap_or_else(|| Arc::new(BasicParser));
        let syntax = SyntaxCache::new(parser);
        let dirs = DirCache::new();
        let resolver = Resolver::new(
            &completed,
            config.registry.clone(),
            config.fetch_context.clone(),
        )
        .with_caches(syntax.clone(), dirs.clone());
        Ok(Self {
            completed,
            syntax,
            dirs,
            tagger: Tagger::new(&config.tags),
            options: BuildOptions {
                tests: config.tests,
                tools: config.tools,
                data_files: config.data_files,
                all_cue_files: config.all_cue_files,
            },
            resolver,
            package: config.package.clone(),
            tags: config.tags.clone(),
            tag_vars: config.tag_vars.clone().unwrap_or_else(default_tag_vars),
        })
    }

    pub fn build_context(&self) -> BuildContext<'_> {
        BuildContext {
            syntax: &self.syntax,
            dirs: &self.dirs,
            tagger: &self.tagger,
            options: self.options,
            cwd: &self.completed.dir,
        }
    }
}
