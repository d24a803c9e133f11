//! Verification report — how every service in a rollout ended.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::node::NodeState;

/// Why a service did not reach `Healthy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Retry budget ran out while the probe still reported unhealthy.
    Timeout,
    /// The probe is misconfigured.
    ProbeError(String),
    /// A dependency ended in a non-healthy state; startup was skipped.
    DependencyUnhealthy,
    /// The startup action failed or exceeded its timeout.
    StartupFailed(String),
    /// The rollout was interrupted.
    Cancelled,
    /// A one-shot status check found the service unhealthy.
    Unhealthy,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => f.write_str("timeout"),
            FailureReason::ProbeError(detail) => write!(f, "probe error: {detail}"),
            FailureReason::DependencyUnhealthy => f.write_str("dependency unhealthy"),
            FailureReason::StartupFailed(detail) => write!(f, "startup failed: {detail}"),
            FailureReason::Cancelled => f.write_str("cancelled"),
            FailureReason::Unhealthy => f.write_str("unhealthy"),
        }
    }
}

/// Final outcome of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReport {
    pub name: String,
    pub state: NodeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    /// Probe invocations made for this service.
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl NodeReport {
    pub fn healthy(name: &str, attempts: u32, elapsed: Duration) -> Self {
        Self::new(name, NodeState::Healthy, None, attempts, elapsed)
    }

    pub fn unhealthy(
        name: &str,
        state: NodeState,
        reason: FailureReason,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self::new(name, state, Some(reason), attempts, elapsed)
    }

    fn new(
        name: &str,
        state: NodeState,
        reason: Option<FailureReason>,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            state,
            reason,
            attempts,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// `name<TAB>state<TAB>reason`, with `-` for no reason.
    pub fn line(&self) -> String {
        let reason = self
            .reason
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        format!("{}\t{}\t{}", self.name, self.state, reason)
    }
}

/// Per-service outcomes in plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    entries: Vec<NodeReport>,
}

impl VerificationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, entry: NodeReport) {
        debug_assert!(self.get(&entry.name).is_none(), "service reported twice");
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[NodeReport] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&NodeReport> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn state_of(&self, name: &str) -> Option<NodeState> {
        self.get(name).map(|e| e.state)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn healthy_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.state == NodeState::Healthy)
            .count()
    }

    /// Every service reached `Healthy`. Vacuously true for an empty rollout.
    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|e| e.state == NodeState::Healthy)
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }

    /// Machine-readable form: one [`NodeReport::line`] per service.
    pub fn to_lines(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.line());
            out.push('\n');
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Human-readable summary.
pub fn format_report(title: &str, report: &VerificationReport) -> String {
    let mut out = String::new();

    let verdict = if report.is_success() { "HEALTHY" } else { "DEGRADED" };
    out.push_str(&format!("\nRollout {title}: {verdict}\n"));
    out.push_str(&format!(
        "  {} of {} services healthy\n\n",
        report.healthy_count(),
        report.len()
    ));

    let width = report
        .entries()
        .iter()
        .map(|e| e.name.len())
        .max()
        .unwrap_or(0);
    for entry in report.entries() {
        let mark = match entry.state {
            NodeState::Healthy => "✅",
            NodeState::TimedOut => "⏱️ ",
            _ => "❌",
        };
        out.push_str(&format!(
            "  {mark} {:<width$}  {:<8}  attempts={:<3} {:>6}ms",
            entry.name, entry.state, entry.attempts, entry.elapsed_ms
        ));
        if let Some(reason) = &entry.reason {
            out.push_str(&format!("  ({reason})"));
        }
        out.push('\n');
    }

    out
}
