use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::AssemblyError;
use crate::executor::types::NodeTask;
use crate::executor::TaskKey;

/// The tasks one builder (or one injection) contributes.
#[derive(Debug, Default, Clone)]
pub struct Fragment {
    entries: Vec<(TaskKey, Arc<dyn NodeTask>)>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<TaskKey>, task: impl NodeTask + 'static) -> &mut Self {
        self.entries.push((key.into(), Arc::new(task)));
        self
    }

    pub fn add_shared(&mut self, key: impl Into<TaskKey>, task: Arc<dyn NodeTask>) -> &mut Self {
        self.entries.push((key.into(), task));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &TaskKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn get(&self, key: &TaskKey) -> Option<&Arc<dyn NodeTask>> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, t)| t)
    }

    pub(crate) fn into_entries(self) -> Vec<(TaskKey, Arc<dyn NodeTask>)> {
        self.entries
    }
}

/// Task dependency graph (DAG)
///
/// Only constructed through [`TaskGraph::from_entries`], which rejects
/// duplicate keys, dangling references and cycles.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    /// Task nodes: key -> Task
    nodes: HashMap<TaskKey, Arc<dyn NodeTask>>,

    /// Dependency edges: key -> keys it references
    edges: HashMap<TaskKey, Vec<TaskKey>>,

    /// Reverse edges: key -> keys that reference it
    reverse_edges: HashMap<TaskKey, Vec<TaskKey>>,

    /// Original insertion order (for stable sorting)
    insertion_order: Vec<TaskKey>,
}

impl TaskGraph {
    /// Construct and validate a graph from `(key, task)` pairs.
    ///
    /// Duplicates here carry no source information; the [`Assembler`](super::Assembler)
    /// catches them earlier with both contributors named.
    pub fn from_entries(
        entries: Vec<(TaskKey, Arc<dyn NodeTask>)>,
    ) -> Result<Self, AssemblyError> {
        let mut nodes = HashMap::new();
        let mut edges = HashMap::new();
        let mut reverse_edges: HashMap<TaskKey, Vec<TaskKey>> = HashMap::new();
        let mut insertion_order = Vec::new();

        for (key, task) in entries {
            if nodes.contains_key(&key) {
                return Err(AssemblyError::DuplicateKey {
                    key,
                    first: "graph".to_string(),
                    second: "graph".to_string(),
                });
            }

            let dependencies = task.dependencies();
            for dep in &dependencies {
                reverse_edges.entry(dep.clone()).or_default().push(key.clone());
            }

            edges.insert(key.clone(), dependencies);
            nodes.insert(key.clone(), task);
            insertion_order.push(key);
        }

        let graph = Self {
            nodes,
            edges,
            reverse_edges,
            insertion_order,
        };
        graph.validate()?;
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, key: &TaskKey) -> Option<&Arc<dyn NodeTask>> {
        self.nodes.get(key)
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Keys in the order they were contributed.
    pub fn keys(&self) -> &[TaskKey] {
        &self.insertion_order
    }

    pub fn dependencies(&self, key: &TaskKey) -> &[TaskKey] {
        self.edges.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dependents(&self, key: &TaskKey) -> &[TaskKey] {
        self.reverse_edges
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn validate(&self) -> Result<(), AssemblyError> {
        // Check all references resolve, in insertion order for stable errors
        for key in &self.insertion_order {
            for dep in self.dependencies(key) {
                if !self.nodes.contains_key(dep) {
                    return Err(AssemblyError::DependencyNotFound {
                        task: key.clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }

        if let Some(cycle) = self.detect_cycle() {
            return Err(AssemblyError::Cycle(cycle));
        }

        Ok(())
    }

    /// Topological sort using Kahn's algorithm
    ///
    /// Returns stages where tasks in the same stage have no dependency on each
    /// other. Within a stage, keys keep their insertion order.
    ///
    /// # Time Complexity
    ///
    /// O(V + E) where V = number of tasks, E = number of dependencies
    pub fn stages(&self) -> Vec<Vec<TaskKey>> {
        let position: HashMap<&TaskKey, usize> = self
            .insertion_order
            .iter()
            .enumerate()
            .map(|(i, k)| (k, i))
            .collect();

        // edges[A] = [B, C] means A depends on B and C, so A's in-degree is 2
        let mut in_degree: HashMap<&TaskKey, usize> = self
            .insertion_order
            .iter()
            .map(|k| (k, self.dependencies(k).len()))
            .collect();

        let mut stages: Vec<Vec<TaskKey>> = Vec::new();
        let mut current_stage: Vec<TaskKey> = self
            .insertion_order
            .iter()
            .filter(|k| in_degree[k] == 0)
            .cloned()
            .collect();

        while !current_stage.is_empty() {
            let mut next_stage = Vec::new();

            for key in &current_stage {
                for dependent in self.dependents(key) {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            next_stage.push(dependent.clone());
                        }
                    }
                }
            }

            next_stage.sort_by_key(|k| position.get(k).copied().unwrap_or(usize::MAX));
            stages.push(std::mem::replace(&mut current_stage, next_stage));
        }

        stages
    }

    /// Every key, each after all keys it references.
    pub fn topological_order(&self) -> Vec<TaskKey> {
        self.stages().into_iter().flatten().collect()
    }

    /// Detect circular dependencies using DFS
    fn detect_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for key in &self.insertion_order {
            if !visited.contains(key) && self.dfs_cycle(key, &mut visited, &mut stack) {
                return Some(format_cycle_path(&stack));
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        node: &TaskKey,
        visited: &mut HashSet<TaskKey>,
        stack: &mut Vec<TaskKey>,
    ) -> bool {
        visited.insert(node.clone());
        stack.push(node.clone());

        for dep in self.dependencies(node) {
            // Dependency already on the current path: cycle
            if let Some(pos) = stack.iter().position(|x| x == dep) {
                stack.push(dep.clone());
                *stack = stack[pos..].to_vec();
                return true;
            }

            if !visited.contains(dep) && self.dfs_cycle(dep, visited, stack) {
                return true;
            }
        }

        stack.pop();
        false
    }
}

fn format_cycle_path(stack: &[TaskKey]) -> String {
    stack
        .iter()
        .map(TaskKey::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
