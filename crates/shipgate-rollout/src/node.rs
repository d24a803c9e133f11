//! Service nodes and their rollout state machine.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shipgate_health::{HealthProbe, RetryPolicy};

use crate::action::{NoopAction, StartupAction};
use crate::error::{RolloutError, RolloutResult};
use crate::planner::PlanNode;

/// Where a node is in its rollout.
///
/// ```text
/// Pending ──▶ Starting ──▶ Polling ──▶ Healthy
///    │           │             ├──▶ TimedOut
///    │           │             └──▶ Failed
///    └───────────┴──────────────▶ Failed
/// ```
///
/// Every retry of the probe happens inside a single `Polling` stay; the
/// per-attempt count lives in the report, not in state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Starting,
    Polling,
    Healthy,
    Failed,
    TimedOut,
}

impl NodeState {
    /// Terminal states never change for the rest of a rollout.
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeState::Healthy | NodeState::Failed | NodeState::TimedOut)
    }

    /// Whether the executor may move a node from `self` to `next`. Each
    /// move strictly advances; no state is re-entered.
    pub fn can_transition_to(self, next: NodeState) -> bool {
        use NodeState::*;
        matches!(
            (self, next),
            (Pending, Starting)
                | (Pending, Failed)
                | (Starting, Polling)
                | (Starting, Failed)
                | (Polling, Healthy)
                | (Polling, Failed)
                | (Polling, TimedOut)
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            NodeState::Pending => "Pending",
            NodeState::Starting => "Starting",
            NodeState::Polling => "Polling",
            NodeState::Healthy => "Healthy",
            NodeState::Failed => "Failed",
            NodeState::TimedOut => "TimedOut",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// A named unit of deployment.
pub struct ServiceNode {
    name: String,
    depends_on: Vec<String>,
    pub(crate) action: Box<dyn StartupAction>,
    pub(crate) probe: Box<dyn HealthProbe>,
    pub(crate) retry: RetryPolicy,
    pub(crate) startup_timeout: Option<Duration>,
    state: NodeState,
}

impl ServiceNode {
    /// A node with no dependencies, a no-op startup action, and the default
    /// retry policy.
    pub fn new(name: impl Into<String>, probe: Box<dyn HealthProbe>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            action: Box::new(NoopAction),
            probe,
            retry: RetryPolicy::default(),
            startup_timeout: None,
            state: NodeState::Pending,
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_action(mut self, action: Box<dyn StartupAction>) -> Self {
        self.action = action;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn probe(&self) -> &dyn HealthProbe {
        self.probe.as_ref()
    }

    pub(crate) fn transition(&mut self, next: NodeState) -> RolloutResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(RolloutError::InvalidTransition {
                name: self.name.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Back to `Pending` for a fresh rollout invocation.
    pub(crate) fn reset(&mut self) {
        self.state = NodeState::Pending;
    }
}

impl PlanNode for ServiceNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn depends_on(&self) -> &[String] {
        &self.depends_on
    }
}

impl fmt::Debug for ServiceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceNode")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("action", &self.action.describe())
            .field("probe", &self.probe.describe())
            .field("retry", &self.retry)
            .field("startup_timeout", &self.startup_timeout)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use shipgate_health::TcpProbe;

    use super::*;

    const ALL: [NodeState; 6] = [
        NodeState::Pending,
        NodeState::Starting,
        NodeState::Polling,
        NodeState::Healthy,
        NodeState::Failed,
        NodeState::TimedOut,
    ];

    fn node() -> ServiceNode {
        ServiceNode::new("db", Box::new(TcpProbe::new("localhost:5432")))
    }

    #[test]
    fn terminal_states_never_change() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn happy_path_transitions() {
        let mut node = node();
        assert_eq!(node.state(), NodeState::Pending);
        node.transition(NodeState::Starting).unwrap();
        node.transition(NodeState::Polling).unwrap();
        node.transition(NodeState::Healthy).unwrap();
        assert_eq!(node.state(), NodeState::Healthy);
    }

    #[test]
    fn cannot_skip_starting() {
        let mut node = node();
        let err = node.transition(NodeState::Polling).unwrap_err();
        assert!(matches!(
            err,
            RolloutError::InvalidTransition {
                from: NodeState::Pending,
                to: NodeState::Polling,
                ..
            }
        ));
        assert_eq!(node.state(), NodeState::Pending);
    }

    #[test]
    fn no_state_is_reentered() {
        for state in ALL {
            assert!(!state.can_transition_to(state), "{state} -> {state} must be rejected");
        }

        let mut node = node();
        node.transition(NodeState::Starting).unwrap();
        node.transition(NodeState::Polling).unwrap();
        assert!(node.transition(NodeState::Polling).is_err());
        assert_eq!(node.state(), NodeState::Polling);
    }

    #[test]
    fn pending_may_fail_directly() {
        let mut node = node();
        node.transition(NodeState::Failed).unwrap();
        assert!(node.transition(NodeState::Starting).is_err());
    }

    #[test]
    fn reset_returns_to_pending() {
        let mut node = node();
        node.transition(NodeState::Failed).unwrap();
        node.reset();
        assert_eq!(node.state(), NodeState::Pending);
    }

    #[test]
    fn builder_sets_dependencies() {
        let node = node().with_dependencies(["a", "b"]);
        assert_eq!(node.dependencies(), &["a".to_string(), "b".to_string()]);
        assert_eq!(PlanNode::name(&node), "db");
    }

    #[test]
    fn state_labels() {
        assert_eq!(NodeState::TimedOut.to_string(), "TimedOut");
        assert_eq!(serde_json::to_string(&NodeState::TimedOut).unwrap(), "\"timed_out\"");
    }
}
