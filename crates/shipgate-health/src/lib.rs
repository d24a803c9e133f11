//! shipgate-health — "is this service healthy right now?" and "wait until it is".
//!
//! # Architecture
//!
//! ```text
//! RetryPolicy::poll(probe, cancellation)
//!   ├── check_with_timeout(probe) → ProbeOutcome   (one attempt)
//!   │     ├── HttpProbe       GET url, compare status
//!   │     ├── TcpProbe        connect host:port
//!   │     └── ContainerProbe  runtime status query, normalized JSON field
//!   ├── sleep(interval) between attempts
//!   └── PollOutcome: Healthy | TimedOut | Failed | Cancelled
//! ```
//!
//! Transient conditions (connection refused, field absent, slow probe) are
//! `Unhealthy` and retried. Only malformed probe configuration is `Error`,
//! which stops polling immediately.

pub mod cancel;
pub mod container;
pub mod probe;
pub mod retry;

pub use cancel::{cancellation, CancelHandle, Cancellation};
pub use container::{health_field, ContainerProbe};
pub use probe::{check_with_timeout, BoxFuture, HealthProbe, HttpProbe, ProbeOutcome, TcpProbe};
pub use retry::{Exhausted, PollOutcome, RetryPolicy};
