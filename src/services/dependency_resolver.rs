//! Pack-level `depends_on` ordering and checks.

use crate::domain::models::Pack;
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};

/// Advisory pack-level dependency checks. Never blocks a run.
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver;

/// A `depends_on` entry naming a pack that is not in the desired set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    /// Pack declaring the dependency
    pub pack: String,
    /// Pack it names
    pub dependency: String,
}

// Standalone helper for cycle detection (no self needed)
fn detect_cycle_util<'a>(
    node: &'a str,
    graph: &BTreeMap<&'a str, Vec<&'a str>>,
    visited: &mut BTreeSet<&'a str>,
    rec_stack: &mut BTreeSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(node) {
        for &neighbor in neighbors {
            if !visited.contains(neighbor) {
                if detect_cycle_util(neighbor, graph, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(neighbor) {
                if let Some(cycle_start) = path.iter().position(|&id| id == neighbor) {
                    path.drain(0..cycle_start);
                    return true;
                }
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    false
}

/// Dependency edges restricted to packs present in `packs`.
fn build_graph<'a>(packs: &[&'a Pack]) -> BTreeMap<&'a str, Vec<&'a str>> {
    let ids: BTreeSet<&str> = packs.iter().map(|p| p.id()).collect();
    packs
        .iter()
        .map(|pack| {
            let deps = pack
                .manifest
                .depends_on
                .iter()
                .map(String::as_str)
                .filter(|dep| ids.contains(dep))
                .collect();
            (pack.id(), deps)
        })
        .collect()
}

impl DependencyResolver {
    /// A resolver; it holds no state.
    pub fn new() -> Self {
        Self
    }

    /// Dependencies declared by `packs` that are not themselves in `packs`.
    pub fn missing_dependencies(&self, packs: &[&Pack]) -> Vec<MissingDependency> {
        let ids: BTreeSet<&str> = packs.iter().map(|p| p.id()).collect();
        let mut missing = Vec::new();
        for pack in packs {
            for dep in &pack.manifest.depends_on {
                if !ids.contains(dep.as_str()) {
                    missing.push(MissingDependency {
                        pack: pack.id().to_string(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        missing
    }

    /// Detect circular dependencies among a set of packs
    pub fn detect_cycle(&self, packs: &[&Pack]) -> Option<Vec<String>> {
        let graph = build_graph(packs);

        let mut visited = BTreeSet::new();
        let mut rec_stack = BTreeSet::new();
        let mut path = Vec::new();

        for &pack_id in graph.keys() {
            if !visited.contains(pack_id)
                && detect_cycle_util(pack_id, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(path.into_iter().map(String::from).collect());
            }
        }

        None
    }

    /// Pack ids in dependency order (dependencies first), ties broken alphabetically.
    pub fn topological_sort(&self, packs: &[&Pack]) -> Result<Vec<String>> {
        if let Some(cycle) = self.detect_cycle(packs) {
            return Err(anyhow::anyhow!(
                "Circular dependency detected: {}",
                cycle.join(" -> ")
            ));
        }

        let graph = build_graph(packs);
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for (&pack_id, deps) in &graph {
            in_degree.entry(pack_id).or_insert(0);
            for &dep in deps {
                dependents.entry(dep).or_default().push(pack_id);
                *in_degree.entry(pack_id).or_insert(0) += 1;
            }
        }

        // Kahn's algorithm; BTreeSet keeps the ready set ordered
        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut sorted = Vec::with_capacity(graph.len());

        while let Some(pack_id) = ready.pop_first() {
            sorted.push(pack_id.to_string());

            if let Some(neighbors) = dependents.get(pack_id) {
                for &neighbor in neighbors {
                    if let Some(degree) = in_degree.get_mut(neighbor) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(neighbor);
                        }
                    }
                }
            }
        }

        if sorted.len() != graph.len() {
            return Err(anyhow::anyhow!(
                "Topological sort failed: possible cycle or disconnected graph"
            ));
        }

        Ok(sorted)
    }

    /// Install order plus advisory warnings. A cycle falls back to alphabetical order.
    pub fn install_order(&self, packs: &[&Pack]) -> (Vec<String>, Vec<String>) {
        let mut warnings: Vec<String> = self
            .missing_dependencies(packs)
            .into_iter()
            .map(|m| {
                format!(
                    "pack '{}' depends on '{}', which is not selected",
                    m.pack, m.dependency
                )
            })
            .collect();

        let order = match self.topological_sort(packs) {
            Ok(order) => order,
            Err(e) => {
                warnings.push(e.to_string());
                let ids: BTreeSet<&str> = packs.iter().map(|p| p.id()).collect();
                ids.into_iter().map(String::from).collect()
            }
        };

        (order, warnings)
    }
}
