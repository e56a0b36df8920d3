//! Dependency graph for workspace packages

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use super::discovery::PackageRecord;

/// A node in the dependency graph
#[derive(Debug, Clone, Serialize)]
pub struct PackageNode {
    /// Package name
    pub name: String,
    /// Position in discovery order
    pub index: usize,
    /// Packages this package depends on
    pub dependencies: Vec<String>,
    /// Packages that depend on this package
    pub dependents: Vec<String>,
}

/// Dependency graph for workspace packages
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Nodes in discovery order
    nodes: Vec<PackageNode>,
    /// Name to node index
    index: HashMap<String, usize>,
    /// Publish order: dependencies before dependents, cycle members last
    sorted_order: Vec<String>,
    /// Circular dependencies detected
    cycles: Vec<Vec<String>>,
}

impl DependencyGraph {
    /// Build a dependency graph from discovered packages
    pub fn build(packages: &[PackageRecord]) -> Self {
        let index: HashMap<String, usize> = packages
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), i))
            .collect();

        let mut nodes: Vec<PackageNode> = packages
            .iter()
            .enumerate()
            .map(|(i, p)| PackageNode {
                name: p.name.clone(),
                index: i,
                dependencies: p
                    .dependencies
                    .iter()
                    .filter(|d| index.contains_key(*d) && **d != p.name)
                    .cloned()
                    .collect(),
                dependents: Vec::new(),
            })
            .collect();

        // Reverse edges, in discovery order of the dependent
        for i in 0..nodes.len() {
            let name = nodes[i].name.clone();
            for dep in nodes[i].dependencies.clone() {
                if let Some(&j) = index.get(&dep) {
                    nodes[j].dependents.push(name.clone());
                }
            }
        }

        let (sorted_order, cycles) = Self::topological_sort(&nodes, &index);

        if !cycles.is_empty() {
            for cycle in &cycles {
                warn!(cycle = %Self::describe(cycle), "circular workspace dependency");
            }
        }
        debug!(packages = nodes.len(), cycles = cycles.len(), "dependency graph built");

        Self {
            nodes,
            index,
            sorted_order,
            cycles,
        }
    }

    /// Kahn's algorithm; ready nodes are taken in discovery order
    fn topological_sort(
        nodes: &[PackageNode],
        index: &HashMap<String, usize>,
    ) -> (Vec<String>, Vec<Vec<String>>) {
        let mut in_degree: Vec<usize> = nodes.iter().map(|n| n.dependencies.len()).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut sorted: Vec<String> = Vec::with_capacity(nodes.len());
        let mut placed = vec![false; nodes.len()];

        while let Some(Reverse(i)) = ready.pop() {
            sorted.push(nodes[i].name.clone());
            placed[i] = true;

            for dependent in &nodes[i].dependents {
                if let Some(&j) = index.get(dependent) {
                    in_degree[j] = in_degree[j].saturating_sub(1);
                    if in_degree[j] == 0 {
                        ready.push(Reverse(j));
                    }
                }
            }
        }

        let mut cycles = Vec::new();
        if sorted.len() != nodes.len() {
            let cyclic_nodes: HashSet<&str> = nodes
                .iter()
                .filter(|n| !placed[n.index])
                .map(|n| n.name.as_str())
                .collect();

            for node in nodes.iter().filter(|n| !placed[n.index]) {
                if let Some(cycle) = Self::find_cycle(nodes, index, &node.name, &cyclic_nodes) {
                    let known = cycles.iter().any(|c: &Vec<String>| {
                        c.len() == cycle.len() && cycle.iter().all(|n| c.contains(n))
                    });
                    if !known {
                        cycles.push(cycle);
                    }
                }
            }

            // Members of a cycle, and anything that waits on one, go last
            for node in nodes.iter().filter(|n| !placed[n.index]) {
                sorted.push(node.name.clone());
            }
        }

        (sorted, cycles)
    }

    /// Find a cycle through `start`, restricted to unplaced nodes
    fn find_cycle(
        nodes: &[PackageNode],
        index: &HashMap<String, usize>,
        start: &str,
        cyclic_nodes: &HashSet<&str>,
    ) -> Option<Vec<String>> {
        fn dfs(
            nodes: &[PackageNode],
            index: &HashMap<String, usize>,
            current: &str,
            start: &str,
            visited: &mut HashSet<String>,
            path: &mut Vec<String>,
            cyclic_nodes: &HashSet<&str>,
        ) -> bool {
            if current == start && !path.is_empty() {
                return true;
            }
            if visited.contains(current) || !cyclic_nodes.contains(current) {
                return false;
            }

            visited.insert(current.to_string());
            path.push(current.to_string());

            if let Some(node) = index.get(current).map(|&i| &nodes[i]) {
                for dep in &node.dependencies {
                    if dfs(nodes, index, dep, start, visited, path, cyclic_nodes) {
                        return true;
                    }
                }
            }

            path.pop();
            false
        }

        let mut visited = HashSet::new();
        let mut path = Vec::new();
        if dfs(nodes, index, start, start, &mut visited, &mut path, cyclic_nodes) {
            Some(path)
        } else {
            None
        }
    }

    fn describe(cycle: &[String]) -> String {
        let mut parts: Vec<&str> = cycle.iter().map(String::as_str).collect();
        if let Some(first) = cycle.first() {
            parts.push(first);
        }
        parts.join(" -> ")
    }

    /// Get packages in publish order (dependencies first)
    pub fn sorted(&self) -> &[String] {
        &self.sorted_order
    }

    /// Check if there are any circular dependencies
    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// Get detected circular dependencies
    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    /// Human readable cycle descriptions, e.g. `a -> b -> a`
    pub fn cycle_descriptions(&self) -> Vec<String> {
        self.cycles.iter().map(|c| Self::describe(c)).collect()
    }

    /// Get a package node
    pub fn get(&self, name: &str) -> Option<&PackageNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Direct dependents of a package, in discovery order
    pub fn dependents(&self, name: &str) -> &[String] {
        self.get(name).map(|n| n.dependents.as_slice()).unwrap_or(&[])
    }

    /// Direct dependencies of a package
    pub fn dependencies(&self, name: &str) -> &[String] {
        self.get(name).map(|n| n.dependencies.as_slice()).unwrap_or(&[])
    }

    /// Reorder package records into publish order
    pub fn order_packages(&self, packages: Vec<PackageRecord>) -> Vec<PackageRecord> {
        let mut by_name: HashMap<String, PackageRecord> =
            packages.into_iter().map(|p| (p.name.clone(), p)).collect();

        let mut ordered: Vec<PackageRecord> = self
            .sorted_order
            .iter()
            .filter_map(|name| by_name.remove(name))
            .collect();

        // Records the graph was not built from keep their relative order at the end
        let mut rest: Vec<PackageRecord> = by_name.into_values().collect();
        rest.sort_by(|a, b| a.dir_name.cmp(&b.dir_name));
        ordered.extend(rest);
        ordered
    }
}

#[cfg(test)]
pub(crate) fn record(name: &str, deps: &[&str]) -> PackageRecord {
    PackageRecord {
        name: name.to_string(),
        dir_name: name.to_string(),
        full_path: std::path::PathBuf::from("packages").join(name),
        version: "1.0.0".to_string(),
        description: None,
        scripts: HashMap::new(),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        private: false,
        last_publish: None,
        change_state: Default::default(),
        new_commits: None,
        total_commits: None,
    }
}
