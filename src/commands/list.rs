//! # List Command Implementation
//!
//! This module implements the `list` subcommand, which loads the packages
//! matched by the given patterns and prints, for each of them, its import
//! path, package name, directory and files, or the errors it carries.
//!
//! The command fails (exit code 1) when any listed package has errors.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use cueload::config::Config;
use cueload::filesystem::absolute;
use cueload::instance::BuildUnit;
use cueload::registry::DirRegistry;

use super::registry_root;

/// List the packages matched by the given patterns
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Package patterns (`.`, `./dir`, `./dir/...`, import paths) followed
    /// by explicit `.cue` or data files.
    #[arg(value_name = "PATTERNS")]
    pub patterns: Vec<String>,

    /// Package to select: a name, `_` for anonymous files or `*` for all.
    #[arg(short, long, value_name = "PKG", default_value = "")]
    pub package: String,

    /// Tags for build constraints and injection (`name` or `key=value`).
    #[arg(short, long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// The directory patterns are resolved against.
    ///
    /// If not provided, it defaults to the current working directory.
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Include `_test.cue` files.
    #[arg(long)]
    pub tests: bool,

    /// Include `_tool.cue` files.
    #[arg(long)]
    pub tools: bool,

    /// Include data files (JSON, YAML, TOML, text) in packages.
    #[arg(long)]
    pub data_files: bool,

    /// Ignore `@if` and `@ignore` build constraints.
    #[arg(long)]
    pub all_cue_files: bool,

    /// The module cache directory dependencies are read from.
    ///
    /// Defaults to `cueload/mod` under the system cache directory.
    /// Can also be set with the `CUELOAD_REGISTRY` environment variable.
    #[arg(long, value_name = "DIR", env = "CUELOAD_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Print one JSON document describing every package.
    #[arg(long)]
    pub json: bool,
}

/// JSON form of a listed package.
#[derive(Debug, Serialize)]
struct UnitReport {
    display_path: String,
    import_path: String,
    package: String,
    dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    module: Option<String>,
    files: Vec<String>,
    imports: Vec<String>,
    dependencies: Vec<String>,
    tags: Vec<String>,
    incomplete: bool,
    errors: Vec<String>,
}

impl UnitReport {
    fn new(unit: &BuildUnit, cwd: &Path) -> Self {
        Self {
            display_path: unit.display_path.clone(),
            import_path: unit.import_path.clone(),
            package: unit.package_name.clone(),
            dir: unit.dir.display().to_string(),
            module: unit.module.clone(),
            files: unit
                .build_files
                .iter()
                .map(|f| relative(cwd, &f.filename))
                .collect(),
            imports: unit.import_paths().iter().map(|p| p.to_string()).collect(),
            dependencies: unit
                .dependencies
                .iter()
                .map(|d| d.import_path.clone())
                .collect(),
            tags: unit.all_tags.clone(),
            incomplete: unit.incomplete,
            errors: unit
                .err
                .iter()
                .flat_map(|errs| errs.iter().map(ToString::to_string))
                .collect(),
        }
    }
}

fn relative(cwd: &Path, path: &Path) -> String {
    match path.strip_prefix(cwd) {
        Ok(rel) => rel.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}

/// Execute the `list` command.
pub fn execute(args: ListArgs) -> Result<()> {
    let current = std::env::current_dir()
        .map_err(|e| anyhow::anyhow!("Failed to get current directory: {}", e))?;
    let cwd = match &args.dir {
        Some(dir) => absolute(&current, dir),
        None => current,
    };
    let registry = registry_root(args.registry);
    log::debug!("using module cache {}", registry.display());

    let config = Config {
        dir: Some(cwd.clone()),
        package: args.package,
        tags: args.tags,
        tests: args.tests,
        tools: args.tools,
        data_files: args.data_files,
        all_cue_files: args.all_cue_files,
        registry: Some(Arc::new(DirRegistry::new(registry))),
        ..Default::default()
    };
    let units = cueload::instances(&args.patterns, &config);
    let reports: Vec<UnitReport> = units.iter().map(|u| UnitReport::new(u, &cwd)).collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_report(report);
        }
    }

    let failed = reports.iter().filter(|r| !r.errors.is_empty()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} package(s) failed to load", failed, reports.len());
    }
    Ok(())
}

fn print_report(report: &UnitReport) {
    if !report.errors.is_empty() {
        for err in &report.errors {
            eprintln!("{}: {}", report.display_path, err);
        }
        return;
    }
    println!(
        "{} (package {}) {}",
        report.import_path, report.package, report.dir
    );
    for file in &report.files {
        println!("    {}", file);
    }
    for dep in &report.dependencies {
        println!("    imports {}", dep);
    }
    if report.incomplete {
        println!("    (incomplete: a dependency failed to load)");
    }
}
