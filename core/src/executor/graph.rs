use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::ExecutorError;
use crate::workspace::Package;

/// Workspace packages indexed by name, with internal-dependency queries.
#[derive(Debug, Clone)]
pub struct PackageGraph {
    /// Package nodes: name -> Package
    nodes: HashMap<String, Package>,

    /// Original insertion order (for stable traversal)
    insertion_order: Vec<String>,
}

impl PackageGraph {
    /// Construct the graph from a package list
    pub fn from_packages(packages: Vec<Package>) -> Result<Self, ExecutorError> {
        let mut nodes = HashMap::with_capacity(packages.len());
        let mut insertion_order = Vec::with_capacity(packages.len());

        for package in packages {
            if nodes.contains_key(&package.name) {
                return Err(ExecutorError::DuplicatePackage(package.name));
            }
            insertion_order.push(package.name.clone());
            nodes.insert(package.name.clone(), package);
        }

        Ok(Self {
            nodes,
            insertion_order,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Package> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Package names in the order they were loaded.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.insertion_order.iter().map(String::as_str)
    }

    /// Declared dependencies and devDependencies of `name` that are
    /// themselves workspace packages. Empty for unknown names.
    pub fn internal_dependencies(&self, name: &str) -> BTreeSet<String> {
        let Some(package) = self.nodes.get(name) else {
            return BTreeSet::new();
        };
        package
            .declared_dependency_names()
            .filter(|dep| self.nodes.contains_key(*dep))
            .map(str::to_string)
            .collect()
    }

    /// Find the first dependency cycle using DFS from a synthetic root that
    /// depends on every package.
    ///
    /// Returns the cycle in traversal order with the first element repeated
    /// at the end (`a -> b -> a`), or an empty list when the graph is acyclic.
    ///
    /// # Time Complexity
    ///
    /// O(V + E) where V = number of packages, E = number of internal dependencies
    pub fn detect_cycles(&self) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        // The synthetic root itself never appears in the path.
        for name in &self.insertion_order {
            if !visited.contains(name) && self.dfs_cycle(name, &mut visited, &mut stack) {
                return stack;
            }
        }

        Vec::new()
    }

    /// Same check, as a `Result` for callers that abort on a cycle.
    pub fn validate(&self) -> Result<(), ExecutorError> {
        let cycle = self.detect_cycles();
        if cycle.is_empty() {
            Ok(())
        } else {
            Err(ExecutorError::DependencyCycle(cycle))
        }
    }

    fn dfs_cycle(&self, node: &str, visited: &mut HashSet<String>, stack: &mut Vec<String>) -> bool {
        visited.insert(node.to_string());
        stack.push(node.to_string());

        for dep in self.internal_dependencies(node) {
            // Check if dependency is in current path (cycle detected)
            if let Some(pos) = stack.iter().position(|x| *x == dep) {
                stack.push(dep);
                *stack = stack[pos..].to_vec();
                return true;
            }

            // Recursively check unvisited dependencies
            if !visited.contains(&dep) && self.dfs_cycle(&dep, visited, stack) {
                return true;
            }
        }

        stack.pop();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pkg(name: &str, deps: &[&str]) -> Package {
        deps.iter()
            .fold(Package::new(name, "."), |p, d| p.with_dependency(*d, "*"))
    }

    #[test]
    fn internal_dependencies_ignore_registry_packages() {
        let graph = PackageGraph::from_packages(vec![
            pkg("lib", &[]),
            pkg("util", &[]),
            pkg("app", &["lib", "react"]).with_dev_dependency("util", "*"),
        ])
        .unwrap();

        let deps: Vec<_> = graph.internal_dependencies("app").into_iter().collect();
        assert_eq!(deps, vec!["lib", "util"]);
        assert!(graph.internal_dependencies("missing").is_empty());
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        let graph = PackageGraph::from_packages(vec![
            pkg("a", &["b", "c"]),
            pkg("b", &["c"]),
            pkg("c", &[]),
        ])
        .unwrap();

        assert!(graph.detect_cycles().is_empty());
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn reports_first_cycle_closed_on_its_start() {
        let graph = PackageGraph::from_packages(vec![
            pkg("a", &["b"]),
            pkg("b", &["c"]),
            pkg("c", &["a"]),
        ])
        .unwrap();

        let cycle = graph.detect_cycles();
        assert_eq!(cycle, vec!["a", "b", "c", "a"]);

        let members: BTreeSet<_> = cycle.iter().cloned().collect();
        assert_eq!(
            members,
            ["a", "b", "c"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn cycle_slice_excludes_the_path_leading_into_it() {
        let graph = PackageGraph::from_packages(vec![
            pkg("entry", &["x"]),
            pkg("x", &["y"]),
            pkg("y", &["x"]),
        ])
        .unwrap();

        assert_eq!(graph.detect_cycles(), vec!["x", "y", "x"]);
        assert!(matches!(
            graph.validate(),
            Err(ExecutorError::DependencyCycle(c)) if c.len() == 3
        ));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let graph = PackageGraph::from_packages(vec![pkg("solo", &["solo"])]).unwrap();
        assert_eq!(graph.detect_cycles(), vec!["solo", "solo"]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = PackageGraph::from_packages(vec![pkg("a", &[]), pkg("a", &[])]).unwrap_err();
        assert_eq!(err, ExecutorError::DuplicatePackage("a".into()));
    }
}
