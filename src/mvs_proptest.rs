//! Property-based tests for Minimal Version Selection.
//!
//! Random requirement graphs over four modules with four versions each are
//! generated and the selection checked against the MVS invariants.

#[cfg(test)]
mod proptest_tests {
    use std::collections::HashMap;

    use crate::error::Result;
    use crate::module::{compare_versions, ModuleVersion};
    use crate::mvs::build_list;
    use proptest::prelude::*;

    const MODULES: usize = 4;
    const VERSIONS: usize = 4;

    fn mv(module: usize, version: usize) -> ModuleVersion {
        ModuleVersion::new(
            format!("p.test/m{}@v0", module),
            format!("v0.{}.0", version),
        )
        .unwrap()
    }

    type Graph = HashMap<ModuleVersion, Vec<ModuleVersion>>;

    fn graph(edges: &[Vec<(usize, usize)>]) -> Graph {
        edges
            .iter()
            .enumerate()
            .map(|(i, reqs)| {
                (
                    mv(i / VERSIONS, i % VERSIONS),
                    reqs.iter().map(|&(m, v)| mv(m, v)).collect(),
                )
            })
            .collect()
    }

    fn lookup(g: &Graph) -> impl Fn(&ModuleVersion) -> Result<Vec<ModuleVersion>> + Sync + '_ {
        move |m: &ModuleVersion| Ok(g.get(m).cloned().unwrap_or_default())
    }

    fn edges_strategy() -> impl Strategy<Value = Vec<Vec<(usize, usize)>>> {
        prop::collection::vec(
            prop::collection::vec((0..MODULES, 0..VERSIONS), 0..3),
            MODULES * VERSIONS,
        )
    }

    fn direct_strategy() -> impl Strategy<Value = Vec<(usize, usize)>> {
        prop::collection::vec((0..MODULES, 0..VERSIONS), 1..4)
    }

    proptest! {
        /// Property: feeding the selected versions back as direct
        /// requirements selects the same versions
        #[test]
        fn build_list_is_idempotent(edges in edges_strategy(), direct in direct_strategy()) {
            let g = graph(&edges);
            let main = ModuleVersion::main("p.test/main@v0");
            let direct: Vec<_> = direct.iter().map(|&(m, v)| mv(m, v)).collect();

            let first = build_list(&main, &direct, &lookup(&g)).unwrap();
            let again = build_list(&main, first.dependencies(), &lookup(&g)).unwrap();
            prop_assert_eq!(first.versions(), again.versions());
        }

        /// Property: no requirement of a selected version asks for more than
        /// what was selected
        #[test]
        fn selection_covers_requirements(edges in edges_strategy(), direct in direct_strategy()) {
            let g = graph(&edges);
            let main = ModuleVersion::main("p.test/main@v0");
            let direct: Vec<_> = direct.iter().map(|&(m, v)| mv(m, v)).collect();

            let list = build_list(&main, &direct, &lookup(&g)).unwrap();
            for req in direct.iter().chain(list.dependencies().iter().flat_map(|d| &g[d])) {
                let selected = list.selected(&req.path);
                prop_assert!(selected.is_some(), "{} not selected", req.path);
                let selected = selected.unwrap();
                prop_assert_ne!(
                    compare_versions(req.version.as_deref(), selected.version.as_deref()),
                    std::cmp::Ordering::Greater
                );
            }
        }
    }
}
