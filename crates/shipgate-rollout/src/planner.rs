//! Dependency ordering for a rollout.
//!
//! Kahn's algorithm over the declared `depends_on` edges. Among services
//! that become eligible at the same time, the one declared first goes
//! first, so identical input always yields an identical plan.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::debug;

use crate::error::PlanError;

/// Anything with a name and a dependency list can be planned.
pub trait PlanNode {
    fn name(&self) -> &str;
    fn depends_on(&self) -> &[String];
}

impl PlanNode for shipgate_core::ServiceConfig {
    fn name(&self) -> &str {
        &self.name
    }

    fn depends_on(&self) -> &[String] {
        &self.depends_on
    }
}

/// The bring-up order: every service appears after all of its dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolloutPlan {
    order: Vec<String>,
}

impl RolloutPlan {
    /// Order `nodes`, or explain why they cannot be ordered.
    pub fn build<N: PlanNode>(nodes: &[N]) -> Result<Self, PlanError> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.name(), i).is_some() {
                return Err(PlanError::DuplicateName(node.name().to_string()));
            }
        }

        // deps[i]: distinct dependencies of i; dependents[j]: who waits on j.
        let mut deps: Vec<Vec<usize>> = Vec::with_capacity(nodes.len());
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            let mut distinct = BTreeSet::new();
            for dep in node.depends_on() {
                let &j = index
                    .get(dep.as_str())
                    .ok_or_else(|| PlanError::UnknownDependency {
                        node: node.name().to_string(),
                        dependency: dep.clone(),
                    })?;
                if distinct.insert(j) {
                    dependents[j].push(i);
                }
            }
            deps.push(distinct.into_iter().collect());
        }

        let mut unresolved: Vec<usize> = deps.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| unresolved[i] == 0).collect();
        let mut order = Vec::with_capacity(nodes.len());

        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &k in &dependents[i] {
                unresolved[k] -= 1;
                if unresolved[k] == 0 {
                    ready.insert(k);
                }
            }
        }

        if order.len() < nodes.len() {
            let members = find_cycle(&deps, &unresolved)
                .into_iter()
                .map(|i| nodes[i].name().to_string())
                .collect();
            return Err(PlanError::Cycle { members });
        }

        let order: Vec<String> = order
            .into_iter()
            .map(|i| nodes[i].name().to_string())
            .collect();
        debug!(order = ?order, "rollout plan built");
        Ok(Self { order })
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Index of `name` in the plan.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|n| n == name)
    }
}

/// Walk unresolved dependencies from the first stuck node until a node
/// repeats. Every stuck node has at least one stuck dependency, so the
/// walk always closes a loop.
fn find_cycle(deps: &[Vec<usize>], unresolved: &[usize]) -> Vec<usize> {
    let stuck = |i: usize| unresolved[i] > 0;
    let Some(mut current) = (0..deps.len()).find(|&i| stuck(i)) else {
        return Vec::new();
    };

    let mut path: Vec<usize> = Vec::new();
    let mut seen_at: HashMap<usize, usize> = HashMap::new();
    loop {
        if let Some(&start) = seen_at.get(&current) {
            let mut cycle = path[start..].to_vec();
            cycle.push(current);
            return cycle;
        }
        seen_at.insert(current, path.len());
        path.push(current);
        match deps[current].iter().copied().find(|&d| stuck(d)) {
            Some(next) => current = next,
            None => return path,
        }
    }
}
