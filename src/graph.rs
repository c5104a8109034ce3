//! Cycle detection for task dependencies.
//!
//! Dependency edges must stay acyclic or task completion becomes impossible.
//! Each validation scope (e.g. one sync run) owns its own graph instance;
//! instances are never shared across concurrent validators.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};

/// Adjacency-list dependency graph: task -> the tasks it depends on.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from existing edges, e.g. the persisted edge set.
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut graph = Self::new();
        for (task, dep) in edges {
            graph.add_dependency(&task, &dep);
        }
        graph
    }

    /// Adds an edge: `task` depends on `dependency`.
    pub fn add_dependency(&mut self, task: &str, dependency: &str) {
        self.graph
            .entry(task.to_string())
            .or_default()
            .push(dependency.to_string());
    }

    /// Removes one occurrence of an edge.
    pub fn remove_dependency(&mut self, task: &str, dependency: &str) {
        if let Some(deps) = self.graph.get_mut(task) {
            if let Some(pos) = deps.iter().position(|d| d == dependency) {
                deps.remove(pos);
            }
        }
    }

    /// Checks whether adding `task -> dependency` would close a cycle.
    ///
    /// Self-reference is rejected immediately. Otherwise the edge is added
    /// speculatively, a depth-first cycle search runs from `task`, and the
    /// speculative edge is always rolled back before returning. On failure
    /// the error carries the full cycle path.
    pub fn validate_dependency(&mut self, task: &str, dependency: &str) -> Result<()> {
        if task == dependency {
            return Err(Error::Validation(format!(
                "task cannot depend on itself: {task}"
            )));
        }

        self.add_dependency(task, dependency);
        let cycle = self.find_cycle(task);
        self.remove_dependency(task, dependency);

        match cycle {
            Some(path) => Err(Error::CircularDependency { path }),
            None => Ok(()),
        }
    }

    /// Validates edges one at a time, failing fast on the first invalid one.
    ///
    /// Sequential, not jointly atomic: earlier edges in the slice are
    /// validated (and judged) before later ones, which determines which
    /// dependency gets blamed for a cycle.
    pub fn validate_multiple_dependencies(
        &mut self,
        task: &str,
        dependencies: &[String],
    ) -> Result<()> {
        for dep in dependencies {
            self.validate_dependency(task, dep)?;
        }
        Ok(())
    }

    /// Returns all transitive dependencies of a task, including itself,
    /// in depth-first order. Empty when the task has no edges.
    pub fn dependency_chain(&self, task: &str) -> Vec<String> {
        if !self.graph.contains_key(task) {
            return Vec::new();
        }
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        self.build_chain(task, &mut visited, &mut chain);
        chain
    }

    fn build_chain(&self, task: &str, visited: &mut HashSet<String>, chain: &mut Vec<String>) {
        if !visited.insert(task.to_string()) {
            return;
        }
        chain.push(task.to_string());
        if let Some(deps) = self.graph.get(task) {
            for dep in deps {
                self.build_chain(dep, visited, chain);
            }
        }
    }

    /// Depth-first cycle search from `start`. Nodes on the current stack are
    /// *visiting*; fully explored nodes are *visited*. Revisiting a
    /// *visiting* node closes a cycle, reported as the path from its first
    /// occurrence back to itself.
    fn find_cycle(&self, start: &str) -> Option<Vec<String>> {
        let mut visiting = HashSet::new();
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        self.dfs(start, &mut visiting, &mut visited, &mut path)
    }

    fn dfs(
        &self,
        task: &str,
        visiting: &mut HashSet<String>,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        if visited.contains(task) {
            return None;
        }
        if visiting.contains(task) {
            let cycle_start = path.iter().position(|t| t == task)?;
            let mut cycle: Vec<String> = path[cycle_start..].to_vec();
            cycle.push(task.to_string());
            return Some(cycle);
        }

        visiting.insert(task.to_string());
        path.push(task.to_string());

        if let Some(deps) = self.graph.get(task) {
            for dep in deps {
                if let Some(cycle) = self.dfs(dep, visiting, visited, path) {
                    return Some(cycle);
                }
            }
        }

        path.pop();
        visiting.remove(task);
        visited.insert(task.to_string());
        None
    }
}
