//! Rollout error types.

use std::time::Duration;

use thiserror::Error;

use crate::node::NodeState;

/// Problems with the declared dependency graph. Always raised before any
/// startup action runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("service '{0}' is declared more than once")]
    DuplicateName(String),

    #[error("service '{node}' depends on unknown service '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("dependency cycle: {}", .members.join(" -> "))]
    Cycle {
        /// Closed path; the first and last entries are the same service.
        members: Vec<String>,
    },
}

/// Failure of a startup action. Fatal for the node; never retried.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("startup command is empty")]
    EmptyCommand,

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("startup command exited with {}{}", exit_label(.status), stderr_suffix(.stderr))]
    Exited { status: Option<i32>, stderr: String },

    #[error("startup action did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("{0}")]
    Other(String),
}

/// Errors that abort a rollout as a whole.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Config(#[from] shipgate_core::ConfigError),

    #[error("service '{name}' cannot move from {from} to {to}")]
    InvalidTransition {
        name: String,
        from: NodeState,
        to: NodeState,
    },

    #[error("plan does not match the service set: {0}")]
    PlanMismatch(String),
}

pub type RolloutResult<T> = Result<T, RolloutError>;

fn exit_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}
