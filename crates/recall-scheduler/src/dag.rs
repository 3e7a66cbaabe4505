use std::collections::{HashMap, VecDeque};

use anyhow::Result;
use recall_core::error::AppError;

use crate::task::TaskDefinition;

/// `depends_on` edges between tasks, indexed by position in the task list.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    ids: Vec<String>,
    /// `edges[dep]` lists the tasks that depend on `dep`.
    edges: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl TaskGraph {
    /// Build the graph. Dependencies naming unknown tasks are ignored;
    /// `load_config` rejects those before building.
    pub fn new(tasks: &[TaskDefinition]) -> Self {
        let index: HashMap<&str, usize> = tasks
            .iter()
            .enumerate()
            .map(|(i, task)| (task.id.as_str(), i))
            .collect();

        let mut edges = vec![Vec::new(); tasks.len()];
        let mut incoming = vec![Vec::new(); tasks.len()];
        for (to, task) in tasks.iter().enumerate() {
            for dep in &task.depends_on {
                if let Some(&from) = index.get(dep.as_str()) {
                    if !edges[from].contains(&to) {
                        edges[from].push(to);
                        incoming[to].push(from);
                    }
                }
            }
        }

        Self {
            ids: tasks.iter().map(|task| task.id.clone()).collect(),
            edges,
            incoming,
        }
    }

    pub fn dependents(&self, index: usize) -> &[usize] {
        &self.edges[index]
    }

    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.incoming[index]
    }

    /// Kahn's algorithm. Ties keep file order so runs are reproducible.
    /// A cycle is a [`AppError::Config`] naming every task left on it.
    pub fn topological_order(&self) -> Result<Vec<usize>> {
        let mut indegree: Vec<usize> = self.incoming.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = indegree
            .iter()
            .enumerate()
            .filter_map(|(index, degree)| (*degree == 0).then_some(index))
            .collect();
        let mut order = Vec::with_capacity(self.ids.len());

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &next in &self.edges[node] {
                indegree[next] = indegree[next].saturating_sub(1);
                if indegree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() == self.ids.len() {
            return Ok(order);
        }

        let cycle: Vec<&str> = indegree
            .iter()
            .enumerate()
            .filter_map(|(index, degree)| (*degree > 0).then_some(self.ids[index].as_str()))
            .collect();
        Err(AppError::config(format!(
            "dependency cycle between tasks: {}",
            cycle.join(", ")
        ))
        .into())
    }
}
