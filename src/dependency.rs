//! Dependency resolution: topological ordering, cycle detection, and the
//! dependents index used for cascade-skip at run time.
//!
//! Built around `petgraph`'s directed graph and cycle check the way the
//! original task graph did, but keyed by task name (the processor's
//! primary key) instead of a generated id, and replacing `petgraph`'s
//! arbitrary topological order with a layered Kahn's algorithm that
//! preserves submission order within each independent layer so repeated
//! runs over the same input are deterministic.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::ConfigurationError;
use crate::task::TaskDefinition;

/// Maps each task name to the tasks that depend on it, for O(1) cascade-skip
/// lookups once a task's terminal result is known.
pub struct DependencyIndex {
    dependents: HashMap<String, Vec<String>>,
}

impl DependencyIndex {
    pub fn build(definitions: &[TaskDefinition]) -> Self {
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for def in definitions {
            dependents.entry(def.name.clone()).or_default();
            for dep in &def.dependencies {
                dependents.entry(dep.clone()).or_default().push(def.name.clone());
            }
        }
        Self { dependents }
    }

    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.dependents.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Decrements the in-degree of every direct dependent of `name` and
    /// enqueues any that have just become ready (in-degree reaches zero).
    /// Called once a task has terminated (successfully, skipped, or failed)
    /// so its dependents can be considered for admission.
    pub fn release(&self, name: &str, in_degree: &mut HashMap<String, usize>, ready: &mut VecDeque<String>) {
        for dependent in self.dependents_of(name) {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(dependent.clone());
                }
            }
        }
    }
}

/// Validates the dependency graph and returns a deterministic execution
/// order: a flat list of names such that every dependency precedes its
/// dependents, with submission order preserved among tasks that are mutual
/// independent at any point in the sort.
pub fn resolve_order(definitions: &[TaskDefinition]) -> Result<Vec<String>, ConfigurationError> {
    let known: HashSet<&str> = definitions.iter().map(|d| d.name.as_str()).collect();
    for def in definitions {
        for dep in &def.dependencies {
            if !known.contains(dep.as_str()) {
                return Err(ConfigurationError::UnknownDependency { task: def.name.clone(), dependency: dep.clone() });
            }
        }
    }

    let mut graph = DiGraph::<&str, ()>::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();
    for def in definitions {
        index.insert(def.name.as_str(), graph.add_node(def.name.as_str()));
    }
    for def in definitions {
        for dep in &def.dependencies {
            graph.add_edge(index[dep.as_str()], index[def.name.as_str()], ());
        }
    }
    if is_cyclic_directed(&graph) {
        return Err(ConfigurationError::CircularDependency(definitions.iter().map(|d| d.name.clone()).collect()));
    }

    // Kahn's algorithm, seeding the ready queue in submission order so
    // layers with no relative dependency order stay deterministic.
    let mut in_degree: HashMap<&str, usize> = definitions.iter().map(|d| (d.name.as_str(), d.dependencies.len())).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for def in definitions {
        for dep in &def.dependencies {
            dependents.entry(dep.as_str()).or_default().push(def.name.as_str());
        }
    }

    let mut ready: VecDeque<&str> = definitions.iter().filter(|d| d.dependencies.is_empty()).map(|d| d.name.as_str()).collect();
    let mut order = Vec::with_capacity(definitions.len());
    while let Some(name) = ready.pop_front() {
        order.push(name.to_string());
        if let Some(deps) = dependents.get(name) {
            for &dependent in deps {
                let degree = in_degree.get_mut(dependent).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(dependent);
                }
            }
        }
    }

    debug_assert_eq!(order.len(), definitions.len(), "cycle check above should have caught any unresolved node");
    Ok(order)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn def(name: &str, deps: &[&str]) -> TaskDefinition {
        TaskDefinition::new(name, Arc::new(|_c| Box::pin(async { Ok(Arc::new(()) as crate::task::TaskOutput) })))
            .with_dependencies(deps.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn independent_tasks_preserve_submission_order() {
        let defs = vec![def("c", &[]), def("a", &[]), def("b", &[])];
        assert_eq!(resolve_order(&defs).unwrap(), vec!["c", "a", "b"]);
    }

    #[test]
    fn dependency_precedes_dependent() {
        let defs = vec![def("b", &["a"]), def("a", &[])];
        let order = resolve_order(&defs).unwrap();
        assert!(order.iter().position(|n| n == "a").unwrap() < order.iter().position(|n| n == "b").unwrap());
    }

    #[test]
    fn chain_is_fully_ordered() {
        let defs = vec![def("c", &["b"]), def("b", &["a"]), def("a", &[])];
        assert_eq!(resolve_order(&defs).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn unknown_dependency_is_configuration_error() {
        let defs = vec![def("a", &["ghost"])];
        match resolve_order(&defs) {
            Err(ConfigurationError::UnknownDependency { task, dependency }) => {
                assert_eq!(task, "a");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("expected UnknownDependency, got {other:?}"),
        }
    }

    #[test]
    fn cycle_is_configuration_error() {
        let defs = vec![def("a", &["b"]), def("b", &["a"])];
        assert!(matches!(resolve_order(&defs), Err(ConfigurationError::CircularDependency(_))));
    }

    #[test]
    fn dependents_index_reports_direct_dependents_only() {
        let defs = vec![def("a", &[]), def("b", &["a"]), def("c", &["b"])];
        let idx = DependencyIndex::build(&defs);
        assert_eq!(idx.dependents_of("a"), &["b".to_string()]);
        assert_eq!(idx.dependents_of("b"), &["c".to_string()]);
        assert!(idx.dependents_of("c").is_empty());
    }
}
