//! Minimal Version Selection
//!
//! Starting from the main module's direct requirements, the requirement
//! graph is traversed breadth-first while a running maximum version is kept
//! per module path. The traversal repeats until a full pass leaves every
//! selection unchanged. Requirement lookups are memoized, and lookups at the
//! same depth run in parallel on the rayon pool.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use rayon::prelude::*;

use crate::cache::Cache;
use crate::error::Result;
use crate::module::{compare_versions, ModuleVersion};

/// Requirement lookup used by [`build_list`].
pub type RequirementsFn<'a> = dyn Fn(&ModuleVersion) -> Result<Vec<ModuleVersion>> + Sync + 'a;

/// The selected module versions.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildList {
    /// Main module first, the rest sorted by path.
    versions: Vec<ModuleVersion>,
    index: HashMap<String, usize>,
}

impl BuildList {
    fn new(main: &ModuleVersion, selected: BTreeMap<String, Option<String>>) -> Self {
        let mut versions = vec![main.clone()];
        versions.extend(
            selected
                .into_iter()
                .filter(|(path, _)| *path != main.path)
                .map(|(path, version)| ModuleVersion { path, version }),
        );
        let index = versions
            .iter()
            .enumerate()
            .map(|(i, mv)| (mv.path.clone(), i))
            .collect();
        Self { versions, index }
    }

    /// The version selected for a module path (with major suffix).
    pub fn selected(&self, path: &str) -> Option<&ModuleVersion> {
        self.index.get(path).map(|&i| &self.versions[i])
    }

    pub fn main(&self) -> &ModuleVersion {
        &self.versions[0]
    }

    pub fn versions(&self) -> &[ModuleVersion] {
        &self.versions
    }

    /// Every selected version except the main module.
    pub fn dependencies(&self) -> &[ModuleVersion] {
        &self.versions[1..]
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

fn raise(selected: &mut BTreeMap<String, Option<String>>, mv: &ModuleVersion) {
    match selected.get_mut(&mv.path) {
        Some(current) => {
            if compare_versions(mv.version.as_deref(), current.as_deref()) == Ordering::Greater {
                *current = mv.version.clone();
            }
        }
        None => {
            selected.insert(mv.path.clone(), mv.version.clone());
        }
    }
}

/// Computes the build list for `main` with direct requirements `direct`.
pub fn build_list(
    main: &ModuleVersion,
    direct: &[ModuleVersion],
    reqs: &RequirementsFn<'_>,
) -> Result<BuildList> {
    let memo: Cache<ModuleVersion, Result<Vec<ModuleVersion>>> = Cache::new();
    let lookup = |mv: &ModuleVersion| -> Result<Vec<ModuleVersion>> {
        memo.get_or_insert_with(mv.clone(), || reqs(mv))?
    };

    let mut selected: BTreeMap<String, Option<String>> = BTreeMap::new();
    selected.insert(main.path.clone(), None);

    let mut pass = 0;
    loop {
        pass += 1;
        let before = selected.clone();

        let mut visited: HashSet<ModuleVersion> = HashSet::new();
        let mut level: Vec<ModuleVersion> = direct
            .iter()
            .filter(|mv| mv.path != main.path)
            .cloned()
            .collect();
        for mv in &level {
            raise(&mut selected, mv);
        }

        while !level.is_empty() {
            level.retain(|mv| visited.insert(mv.clone()));
            let results: Vec<(ModuleVersion, Result<Vec<ModuleVersion>>)> = level
                .par_iter()
                .map(|mv| (mv.clone(), lookup(mv)))
                .collect();

            let mut next = Vec::new();
            for (mv, result) in results {
                let required = result?;
                log::trace!("{} requires {} modules", mv, required.len());
                for req in required {
                    // The main module outranks every version of itself.
                    if req.path == main.path {
                        continue;
                    }
                    raise(&mut selected, &req);
                    if !visited.contains(&req) {
                        next.push(req);
                    }
                }
            }
            next.sort();
            next.dedup();
            level = next;
        }

        if selected == before {
            break;
        }
    }

    log::debug!(
        "selected {} module versions in {} passes",
        selected.len(),
        pass
    );
    Ok(BuildList::new(main, selected))
}
