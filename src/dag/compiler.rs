// src/dag/compiler.rs

//! Partition a flat task list into independent Dags.
//!
//! Two tasks land in the same Dag when a chain of pending references
//! connects them, in either direction. Components come from petgraph's
//! union-find; the result is the same partition the naive "recolor until
//! nothing changes" pass produces.

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::unionfind::UnionFind;
use tracing::{debug, info};

use crate::artifact::InputRef;
use crate::dag::dagset::DagSet;
use crate::dag::task::{Task, TaskId};
use crate::errors::{CompileError, Result};

/// Collects declared tasks and turns them into a [`DagSet`].
#[derive(Debug, Default)]
pub struct GraphCompiler {
    tasks: BTreeMap<TaskId, Task>,
}

impl GraphCompiler {
    pub fn new() -> Self {
        Self {
            tasks: BTreeMap::new(),
        }
    }

    /// Build a compiler from tasks, rejecting duplicate ids.
    pub fn from_tasks<I>(tasks: I) -> Result<Self>
    where
        I: IntoIterator<Item = Task>,
    {
        let mut compiler = Self::new();
        for task in tasks {
            compiler.add_task(task)?;
        }
        Ok(compiler)
    }

    pub fn add_task(&mut self, task: Task) -> Result<()> {
        if self.tasks.contains_key(&task.task_id) {
            return Err(CompileError::DuplicateTask(task.task_id).into());
        }
        self.tasks.insert(task.task_id.clone(), task);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Compile into Dags.
    ///
    /// - every task must be valid
    /// - every input must be a source artifact or a pending reference to an
    ///   existing output slot
    /// - the dependency graph must be acyclic
    ///
    /// Components containing only inactive (composite) tasks are dropped.
    pub fn compile(self) -> Result<DagSet> {
        let edges = self.build_edges()?;
        self.check_acyclic(&edges)?;

        let ids: Vec<TaskId> = self.tasks.keys().cloned().collect();
        let index: BTreeMap<&str, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut sets: UnionFind<usize> = UnionFind::new(ids.len());
        for (dst, src) in &edges {
            sets.union(index[dst.as_str()], index[src.as_str()]);
        }

        // Group by root, ordered by the first member's id, so Dag ids are
        // deterministic.
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut group_of_root: BTreeMap<usize, usize> = BTreeMap::new();
        for i in 0..ids.len() {
            let root = sets.find_mut(i);
            let slot = *group_of_root.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(i);
        }

        let mut remaining = self.tasks;
        let mut out = DagSet::new();

        for members in groups {
            let member_ids: Vec<TaskId> = members.iter().map(|&i| ids[i].clone()).collect();
            let tasks: BTreeMap<TaskId, Task> = member_ids
                .iter()
                .filter_map(|id| remaining.remove_entry(id))
                .collect();

            if !tasks.values().any(Task::is_active) {
                debug!(tasks = ?member_ids, "dropping component with no active tasks");
                continue;
            }

            let size = tasks.len();
            let dag_id = out.append(tasks)?;
            debug!(dag = dag_id, tasks = size, "compiled dag");
        }

        info!(
            dags = out.len(),
            tasks = out.task_count(),
            "compiled task list into dags"
        );
        Ok(out)
    }

    /// Edges `(consumer, producer)` for every pending input.
    fn build_edges(&self) -> Result<Vec<(TaskId, TaskId)>> {
        let mut edges = Vec::new();

        for (task_id, task) in &self.tasks {
            task.is_valid()?;

            for (name, input) in &task.inputs {
                match input {
                    InputRef::Source(_) => {}
                    InputRef::Pending(pending) => {
                        let resolves = self
                            .tasks
                            .get(&pending.task_id)
                            .is_some_and(|p| p.outputs.values().any(|s| s.id == pending.id));
                        if !resolves {
                            return Err(CompileError::UnresolvedReference {
                                task: task_id.clone(),
                                input: name.clone(),
                                producer: pending.task_id.clone(),
                            }
                            .into());
                        }
                        edges.push((task_id.clone(), pending.task_id.clone()));
                    }
                    InputRef::Artifact(_) => {
                        return Err(CompileError::BrokenInput {
                            task: task_id.clone(),
                            input: name.clone(),
                        }
                        .into());
                    }
                }
            }
        }

        Ok(edges)
    }

    fn check_acyclic(&self, edges: &[(TaskId, TaskId)]) -> Result<()> {
        // Edge direction: producer -> consumer.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for id in self.tasks.keys() {
            graph.add_node(id.as_str());
        }
        for (dst, src) in edges {
            graph.add_edge(src.as_str(), dst.as_str(), ());
        }

        match toposort(&graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(CompileError::Cycle(cycle.node_id().to_string()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::TaskKind;

    fn shell(id: &str) -> Task {
        Task::new(id, TaskKind::Shell { command: format!("run {id}") })
    }

    fn consume(consumer: &mut Task, name: &str, producer: &Task, output: &str) {
        let slot = producer.output_ref(output).unwrap();
        consumer.add_input(name, InputRef::Pending(slot));
    }

    #[test]
    fn shared_consumer_joins_otherwise_separate_producers() {
        let mut left = shell("left");
        left.declare_output("o");
        let mut right = shell("right");
        right.declare_output("o");
        let mut join = shell("join");
        consume(&mut join, "l", &left, "o");
        consume(&mut join, "r", &right, "o");
        let lonely = shell("lonely");

        let dags = GraphCompiler::from_tasks(vec![right, lonely, join, left])
            .unwrap()
            .compile()
            .unwrap();

        assert_eq!(dags.len(), 2);
        let first: Vec<&str> = dags.dag(0).unwrap().tasks.keys().map(String::as_str).collect();
        assert_eq!(first, vec!["join", "left", "right"]);
        assert_eq!(dags.dag(0).unwrap().dependents_of("left"), vec!["join"]);
        assert!(dags.dag(0).unwrap().dependents_of("join").is_empty());
        assert!(dags.dag(1).unwrap().task("lonely").is_some());
    }
}
