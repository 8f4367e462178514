// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compact-index DAG derived from a pipeline definition.
//!
//! Steps are held in a vector indexed by declaration order; dependencies
//! and dependents are integer edge lists. Everything downstream of the
//! definition (scheduler, executor) carries indices, never owning
//! references between nodes.

use crate::error::ConfigError;
use crate::pipeline::PipelineDef;
use std::collections::HashMap;

/// Dependency structure of a pipeline, indexed by declaration order.
#[derive(Debug, Clone)]
pub struct Dag {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    deps: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

impl Dag {
    /// Build and check the DAG: duplicate ids, unknown or self
    /// dependencies, and cycles are all load-time errors.
    pub fn build(def: &PipelineDef) -> Result<Self, ConfigError> {
        if def.steps.is_empty() {
            return Err(ConfigError::EmptyPipeline(def.name.clone()));
        }

        let mut index = HashMap::with_capacity(def.steps.len());
        for (i, step) in def.steps.iter().enumerate() {
            if index.insert(step.id.clone(), i).is_some() {
                return Err(ConfigError::DuplicateStep(step.id.clone()));
            }
        }

        let mut deps = vec![Vec::new(); def.steps.len()];
        let mut dependents = vec![Vec::new(); def.steps.len()];
        for (i, step) in def.steps.iter().enumerate() {
            for dep in &step.depends_on {
                if dep == &step.id {
                    return Err(ConfigError::SelfDependency(step.id.clone()));
                }
                let Some(&j) = index.get(dep.as_str()) else {
                    return Err(ConfigError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    });
                };
                if !deps[i].contains(&j) {
                    deps[i].push(j);
                    dependents[j].push(i);
                }
            }
        }

        let dag = Self {
            ids: def.steps.iter().map(|s| s.id.clone()).collect(),
            index,
            deps,
            dependents,
        };
        dag.check_acyclic()?;
        Ok(dag)
    }

    /// Kahn's algorithm; leftover nodes are on a cycle.
    fn check_acyclic(&self) -> Result<(), ConfigError> {
        let mut remaining: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut queue: Vec<usize> = (0..self.len()).filter(|&i| remaining[i] == 0).collect();
        let mut visited = 0usize;

        while let Some(i) = queue.pop() {
            visited += 1;
            for &d in &self.dependents[i] {
                remaining[d] -= 1;
                if remaining[d] == 0 {
                    queue.push(d);
                }
            }
        }

        if visited == self.len() {
            return Ok(());
        }
        let cyclic: Vec<&str> = (0..self.len())
            .filter(|&i| remaining[i] > 0)
            .map(|i| self.ids[i].as_str())
            .collect();
        Err(ConfigError::DependencyCycle(cyclic.join(", ")))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id(&self, idx: usize) -> &str {
        &self.ids[idx]
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn deps(&self, idx: usize) -> &[usize] {
        &self.deps[idx]
    }

    pub fn dependents(&self, idx: usize) -> &[usize] {
        &self.dependents[idx]
    }

    /// All steps transitively reachable from `idx` through dependents.
    pub fn downstream(&self, idx: usize) -> Vec<usize> {
        let mut seen = vec![false; self.len()];
        let mut stack: Vec<usize> = self.dependents[idx].to_vec();
        let mut out = Vec::new();
        while let Some(i) = stack.pop() {
            if seen[i] {
                continue;
            }
            seen[i] = true;
            out.push(i);
            stack.extend_from_slice(&self.dependents[i]);
        }
        out.sort_unstable();
        out
    }
}

#[cfg(test)]
#[path = "dag_tests.rs"]
mod tests;
