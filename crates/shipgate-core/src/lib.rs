//! shipgate-core — configuration layer for shipgate rollouts.
//!
//! A rollout is declared in a `shipgate.toml` file: the services to bring
//! up, how each one is started and probed, retry bounds, and the env files
//! to render before anything starts. This crate owns parsing that file,
//! resolving `${VAR}` references against an injected [`Environment`],
//! collecting every pre-flight problem into one error, and rendering env
//! files as pure text.

pub mod config;
pub mod duration;
pub mod env;
pub mod error;
pub mod render;

pub use config::{
    DefaultsConfig, EnvFileConfig, ProbeConfig, RetryConfig, RetrySettings, RolloutSection,
    ServiceConfig, ShipgateConfig, StartupConfig,
};
pub use duration::parse_duration;
pub use env::{Environment, ProcessEnv};
pub use error::{ConfigError, ConfigResult};
pub use render::{render_env_file, write_env_file};
