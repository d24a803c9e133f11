//! Rollout executor — drives each service through start, poll, and verdict.
//!
//! Services run strictly one at a time in plan order. A service only starts
//! once every dependency is `Healthy`; a broken dependency fails its
//! dependents without running their startup actions, while unrelated
//! branches carry on.

use std::collections::HashMap;
use std::time::Duration;

use shipgate_health::{check_with_timeout, Cancellation, PollOutcome, ProbeOutcome};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::action::StartupAction;
use crate::error::{ActionError, RolloutError, RolloutResult};
use crate::node::{NodeState, ServiceNode};
use crate::planner::RolloutPlan;
use crate::report::{FailureReason, NodeReport, VerificationReport};

/// Runs a [`RolloutPlan`] against its service nodes.
pub struct RolloutExecutor {
    cancel: Cancellation,
}

impl RolloutExecutor {
    pub fn new(cancel: Cancellation) -> Self {
        Self { cancel }
    }

    /// Execute the plan. Every node in `nodes` ends in a terminal state and
    /// appears in the returned report, in plan order.
    pub async fn execute(
        &mut self,
        plan: &RolloutPlan,
        nodes: &mut [ServiceNode],
    ) -> RolloutResult<VerificationReport> {
        let index = match_plan(plan, nodes)?;
        for node in nodes.iter_mut() {
            node.reset();
        }

        info!(services = plan.len(), "rollout starting");
        let mut report = VerificationReport::new();
        for name in plan.order() {
            let node = &mut nodes[index[name.as_str()]];
            let entry = self.run_node(node, &report).await?;
            report.record(entry);
        }

        if report.is_success() {
            info!(healthy = report.healthy_count(), "rollout complete, all services healthy");
        } else {
            warn!(
                healthy = report.healthy_count(),
                total = report.len(),
                "rollout finished with unhealthy services"
            );
        }
        Ok(report)
    }

    async fn run_node(
        &mut self,
        node: &mut ServiceNode,
        report: &VerificationReport,
    ) -> RolloutResult<NodeReport> {
        let started = Instant::now();
        let name = node.name().to_string();

        if self.cancel.is_cancelled() {
            node.transition(NodeState::Failed)?;
            info!(service = %name, "rollout cancelled, not starting");
            return Ok(NodeReport::unhealthy(
                &name,
                NodeState::Failed,
                FailureReason::Cancelled,
                0,
                started.elapsed(),
            ));
        }

        let blocked_by = node
            .dependencies()
            .iter()
            .find(|dep| report.state_of(dep) != Some(NodeState::Healthy))
            .cloned();
        if let Some(dependency) = blocked_by {
            node.transition(NodeState::Failed)?;
            warn!(service = %name, %dependency, "dependency unhealthy, skipping startup");
            return Ok(NodeReport::unhealthy(
                &name,
                NodeState::Failed,
                FailureReason::DependencyUnhealthy,
                0,
                started.elapsed(),
            ));
        }

        node.transition(NodeState::Starting)?;
        info!(service = %name, action = %node.action.describe(), "starting service");

        let startup = tokio::select! {
            result = run_startup(node.action.as_ref(), node.startup_timeout) => Some(result),
            _ = self.cancel.cancelled() => None,
        };
        match startup {
            None => {
                node.transition(NodeState::Failed)?;
                warn!(service = %name, "rollout cancelled during startup");
                return Ok(NodeReport::unhealthy(
                    &name,
                    NodeState::Failed,
                    FailureReason::Cancelled,
                    0,
                    started.elapsed(),
                ));
            }
            Some(Err(e)) => {
                node.transition(NodeState::Failed)?;
                warn!(service = %name, error = %e, "startup action failed");
                return Ok(NodeReport::unhealthy(
                    &name,
                    NodeState::Failed,
                    FailureReason::StartupFailed(e.to_string()),
                    0,
                    started.elapsed(),
                ));
            }
            Some(Ok(())) => {}
        }

        node.transition(NodeState::Polling)?;
        info!(
            service = %name,
            probe = %node.probe.describe(),
            max_attempts = node.retry.max_attempts,
            interval = ?node.retry.interval,
            "waiting for service to become healthy"
        );
        let outcome = node.retry.poll(node.probe.as_ref(), &mut self.cancel).await;
        let attempts = outcome.attempts();

        let (state, reason) = match outcome {
            PollOutcome::Healthy { .. } => (NodeState::Healthy, None),
            PollOutcome::TimedOut { .. } => (NodeState::TimedOut, Some(FailureReason::Timeout)),
            PollOutcome::Failed { detail, .. } => {
                (NodeState::Failed, Some(FailureReason::ProbeError(detail)))
            }
            PollOutcome::Cancelled { .. } => (NodeState::Failed, Some(FailureReason::Cancelled)),
        };
        node.transition(state)?;

        let entry = match reason {
            None => {
                info!(service = %name, attempts, "service healthy");
                NodeReport::healthy(&name, attempts, started.elapsed())
            }
            Some(reason) => {
                warn!(service = %name, %state, %reason, attempts, "service did not become healthy");
                NodeReport::unhealthy(&name, state, reason, attempts, started.elapsed())
            }
        };
        Ok(entry)
    }
}

async fn run_startup(
    action: &dyn StartupAction,
    timeout: Option<Duration>,
) -> Result<(), ActionError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, action.start())
            .await
            .map_err(|_| ActionError::TimedOut(limit))?,
        None => action.start().await,
    }
}

/// Map plan names to node indices, rejecting a plan built from other nodes.
fn match_plan<'a>(
    plan: &'a RolloutPlan,
    nodes: &[ServiceNode],
) -> RolloutResult<HashMap<&'a str, usize>> {
    if plan.len() != nodes.len() {
        return Err(RolloutError::PlanMismatch(format!(
            "plan has {} services, node set has {}",
            plan.len(),
            nodes.len()
        )));
    }
    let mut index = HashMap::with_capacity(nodes.len());
    for name in plan.order() {
        let position = nodes
            .iter()
            .position(|n| n.name() == name)
            .ok_or_else(|| RolloutError::PlanMismatch(format!("'{name}' is not in the node set")))?;
        index.insert(name.as_str(), position);
    }
    Ok(index)
}

/// Probe every service once, without startup actions or dependency gating.
///
/// Used for point-in-time status checks.
pub async fn survey(nodes: &[ServiceNode]) -> VerificationReport {
    let mut report = VerificationReport::new();
    for node in nodes {
        let started = Instant::now();
        let entry = match check_with_timeout(node.probe()).await {
            ProbeOutcome::Healthy => NodeReport::healthy(node.name(), 1, started.elapsed()),
            ProbeOutcome::Unhealthy => NodeReport::unhealthy(
                node.name(),
                NodeState::Failed,
                FailureReason::Unhealthy,
                1,
                started.elapsed(),
            ),
            ProbeOutcome::Error(detail) => NodeReport::unhealthy(
                node.name(),
                NodeState::Failed,
                FailureReason::ProbeError(detail),
                1,
                started.elapsed(),
            ),
        };
        report.record(entry);
    }
    report
}

#[cfg(test)]
mod tests {
    use shipgate_health::{BoxFuture, HealthProbe, RetryPolicy};

    use super::*;

    struct Always(ProbeOutcome);

    impl HealthProbe for Always {
        fn check(&self) -> BoxFuture<'_, ProbeOutcome> {
            let outcome = self.0.clone();
            Box::pin(async move { outcome })
        }

        fn describe(&self) -> String {
            format!("always {:?}", self.0)
        }
    }

    struct Hangs;

    impl StartupAction for Hangs {
        fn start(&self) -> BoxFuture<'_, Result<(), ActionError>> {
            Box::pin(std::future::pending())
        }

        fn describe(&self) -> String {
            "hangs".to_string()
        }
    }

    fn node(name: &str, outcome: ProbeOutcome) -> ServiceNode {
        ServiceNode::new(name, Box::new(Always(outcome)))
            .with_retry(RetryPolicy::new(2, Duration::from_secs(1)))
    }

    #[tokio::test(start_paused = true)]
    async fn startup_timeout_is_fatal() {
        let mut nodes = vec![node("web", ProbeOutcome::Healthy)
            .with_action(Box::new(Hangs))
            .with_startup_timeout(Duration::from_secs(30))];
        let plan = RolloutPlan::build(&nodes).unwrap();

        let report = RolloutExecutor::new(Cancellation::never())
            .execute(&plan, &mut nodes)
            .await
            .unwrap();

        let entry = report.get("web").unwrap();
        assert_eq!(entry.state, NodeState::Failed);
        assert!(matches!(entry.reason, Some(FailureReason::StartupFailed(_))));
        assert_eq!(entry.attempts, 0);
        assert_eq!(nodes[0].state(), NodeState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_error_fails_node() {
        let mut nodes = vec![node("web", ProbeOutcome::Error("invalid url".into()))];
        let plan = RolloutPlan::build(&nodes).unwrap();

        let report = RolloutExecutor::new(Cancellation::never())
            .execute(&plan, &mut nodes)
            .await
            .unwrap();

        let entry = report.get("web").unwrap();
        assert_eq!(entry.state, NodeState::Failed);
        assert_eq!(entry.reason, Some(FailureReason::ProbeError("invalid url".into())));
        assert_eq!(entry.attempts, 1);
    }

    #[tokio::test]
    async fn plan_from_other_nodes_is_rejected() {
        let other = vec![node("a", ProbeOutcome::Healthy)];
        let plan = RolloutPlan::build(&other).unwrap();
        let mut nodes = vec![node("b", ProbeOutcome::Healthy)];

        let err = RolloutExecutor::new(Cancellation::never())
            .execute(&plan, &mut nodes)
            .await
            .unwrap_err();
        assert!(matches!(err, RolloutError::PlanMismatch(_)));
        assert_eq!(nodes[0].state(), NodeState::Pending);
    }

    #[tokio::test]
    async fn survey_probes_each_service_once() {
        let nodes = vec![
            node("db", ProbeOutcome::Healthy),
            node("api", ProbeOutcome::Unhealthy).with_dependencies(["db"]),
            node("ui", ProbeOutcome::Error("bad".into())),
        ];
        let report = survey(&nodes).await;

        assert_eq!(report.state_of("db"), Some(NodeState::Healthy));
        assert_eq!(report.get("api").unwrap().reason, Some(FailureReason::Unhealthy));
        assert_eq!(
            report.get("ui").unwrap().reason,
            Some(FailureReason::ProbeError("bad".into()))
        );
        assert!(report.entries().iter().all(|e| e.attempts == 1));
    }
}
