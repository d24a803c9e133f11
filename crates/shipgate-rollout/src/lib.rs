//! shipgate-rollout — bring a set of dependent services up, in order, and
//! report how each one ended.
//!
//! # Components
//!
//! - **`node`** — `ServiceNode` and its state machine
//! - **`action`** — startup actions (`CommandAction`, `NoopAction`)
//! - **`planner`** — dependency ordering with cycle detection
//! - **`executor`** — sequential bring-up with dependency gating and cancellation
//! - **`report`** — per-service terminal states and the process exit code
//! - **`assemble`** — turning a `shipgate.toml` into service nodes
//!
//! # Flow
//!
//! ```text
//! ShipgateConfig ──assemble──▶ [ServiceNode] ──RolloutPlan::build──▶ order
//!                                                      │
//!                     RolloutExecutor::execute ◀───────┘
//!                       for each node in order:
//!                         deps healthy? ─no─▶ Failed(dependency unhealthy)
//!                         start action (timeout) ─err─▶ Failed(startup failed)
//!                         RetryPolicy::poll(probe) ─▶ Healthy | TimedOut | Failed
//!                                                      │
//!                                        VerificationReport ──▶ exit code
//! ```

pub mod action;
pub mod assemble;
pub mod error;
pub mod executor;
pub mod node;
pub mod planner;
pub mod report;

pub use action::{CommandAction, NoopAction, StartupAction};
pub use assemble::build_services;
pub use error::{ActionError, PlanError, RolloutError, RolloutResult};
pub use executor::{survey, RolloutExecutor};
pub use node::{NodeState, ServiceNode};
pub use planner::{PlanNode, RolloutPlan};
pub use report::{format_report, FailureReason, NodeReport, VerificationReport};
