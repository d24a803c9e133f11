//! shipgate.toml configuration parser.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::duration::parse_duration;
use crate::env::{interpolate_value, Environment};
use crate::error::{ConfigError, ConfigResult};

/// Matches the `sleep 15` / `max_attempts=20` loops this replaces.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShipgateConfig {
    pub rollout: RolloutSection,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default, rename = "service")]
    pub services: Vec<ServiceConfig>,
    #[serde(default, rename = "env_file")]
    pub env_files: Vec<EnvFileConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RolloutSection {
    pub name: String,
    /// Variables that must be present (and non-empty) before anything runs.
    #[serde(default)]
    pub required_env: Vec<String>,
}

/// Fallbacks for services that do not set their own values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    pub max_attempts: Option<u32>,
    pub interval: Option<String>,
    pub total_budget: Option<String>,
    pub startup_timeout: Option<String>,
    pub probe_timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Omitted for services that are expected to be running already.
    pub startup: Option<StartupConfig>,
    pub probe: ProbeConfig,
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartupConfig {
    pub command: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ProbeConfig {
    Http {
        url: String,
        #[serde(default = "default_expect_status")]
        expect_status: u16,
        timeout: Option<String>,
    },
    Tcp {
        address: String,
        timeout: Option<String>,
    },
    Container {
        /// Full runtime query. Defaults to `docker compose ps --format json <service>`.
        #[serde(default)]
        command: Vec<String>,
        service: Option<String>,
        #[serde(default = "default_health_field")]
        field: String,
        #[serde(default = "default_expected_health")]
        expected: String,
        timeout: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub interval: Option<String>,
    pub total_budget: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvFileConfig {
    /// Relative paths resolve against the config file's directory.
    pub path: PathBuf,
    #[serde(default = "default_env_file_mode")]
    pub mode: u32,
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

/// Resolved retry bounds for one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub interval: Duration,
    pub total_budget: Option<Duration>,
}

fn default_expect_status() -> u16 {
    200
}

fn default_health_field() -> String {
    "Health".to_string()
}

fn default_expected_health() -> String {
    "healthy".to_string()
}

fn default_env_file_mode() -> u32 {
    0o600
}

impl ShipgateConfig {
    /// Load, interpolate, and pre-flight check a config file.
    pub fn load(path: &Path, env: &dyn Environment) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded rollout config");
        Self::from_str_with_env(&content, env)
    }

    /// Parse config text, resolve `${VAR}` references, and run [`Self::preflight`].
    pub fn from_str_with_env(content: &str, env: &dyn Environment) -> ConfigResult<Self> {
        let mut document: toml::Value =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut unresolved = Vec::new();
        interpolate_value(&mut document, env, &mut unresolved);

        let config: ShipgateConfig = document
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;

        let mut problems: Vec<String> = unresolved
            .iter()
            .map(|name| format!("unresolved variable ${{{name}}}"))
            .collect();
        problems.extend(config.problems(env));

        if problems.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Preflight { problems })
        }
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check everything that can be checked without touching the outside
    /// world, reporting all problems at once.
    pub fn preflight(&self, env: &dyn Environment) -> ConfigResult<()> {
        let problems = self.problems(env);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Preflight { problems })
        }
    }

    fn problems(&self, env: &dyn Environment) -> Vec<String> {
        let mut problems = Vec::new();

        if self.rollout.name.trim().is_empty() {
            problems.push("rollout.name is empty".to_string());
        }

        for var in &self.rollout.required_env {
            if env.get(var).is_none_or(|v| v.is_empty()) {
                problems.push(format!("required environment variable {var} is not set"));
            }
        }

        check_duration(&mut problems, "defaults.interval", self.defaults.interval.as_deref());
        check_duration(&mut problems, "defaults.total_budget", self.defaults.total_budget.as_deref());
        check_duration(&mut problems, "defaults.startup_timeout", self.defaults.startup_timeout.as_deref());
        check_duration(&mut problems, "defaults.probe_timeout", self.defaults.probe_timeout.as_deref());
        if self.defaults.max_attempts == Some(0) {
            problems.push("defaults.max_attempts must be at least 1".to_string());
        }

        let mut seen = HashSet::new();
        for (i, service) in self.services.iter().enumerate() {
            let label = if service.name.trim().is_empty() {
                problems.push(format!("service #{} has an empty name", i + 1));
                format!("service #{}", i + 1)
            } else {
                format!("service '{}'", service.name)
            };
            if !service.name.is_empty() && !seen.insert(service.name.as_str()) {
                problems.push(format!("{label} is declared more than once"));
            }
            service.collect_problems(&label, &mut problems);
        }

        for file in &self.env_files {
            if file.path.as_os_str().is_empty() {
                problems.push("env_file with an empty path".to_string());
            }
            if file.mode > 0o777 {
                problems.push(format!(
                    "env_file '{}' has invalid mode {:o}",
                    file.path.display(),
                    file.mode
                ));
            }
        }

        problems
    }
}

impl ServiceConfig {
    fn collect_problems(&self, label: &str, problems: &mut Vec<String>) {
        if let Some(startup) = &self.startup {
            if startup.command.is_empty() || startup.command[0].trim().is_empty() {
                problems.push(format!("{label}: startup.command is empty"));
            }
            check_duration(problems, &format!("{label}: startup.timeout"), startup.timeout.as_deref());
        }

        if let Some(retry) = &self.retry {
            if retry.max_attempts == Some(0) {
                problems.push(format!("{label}: retry.max_attempts must be at least 1"));
            }
            check_duration(problems, &format!("{label}: retry.interval"), retry.interval.as_deref());
            check_duration(
                problems,
                &format!("{label}: retry.total_budget"),
                retry.total_budget.as_deref(),
            );
        }

        match &self.probe {
            ProbeConfig::Http { url, timeout, .. } => {
                if url.trim().is_empty() {
                    problems.push(format!("{label}: probe.url is empty"));
                }
                check_duration(problems, &format!("{label}: probe.timeout"), timeout.as_deref());
            }
            ProbeConfig::Tcp { address, timeout } => {
                if address.trim().is_empty() {
                    problems.push(format!("{label}: probe.address is empty"));
                }
                check_duration(problems, &format!("{label}: probe.timeout"), timeout.as_deref());
            }
            ProbeConfig::Container {
                command,
                service,
                field,
                timeout,
                ..
            } => {
                if command.is_empty() && service.as_deref().is_none_or(str::is_empty) {
                    problems.push(format!(
                        "{label}: container probe needs either `command` or `service`"
                    ));
                }
                if field.trim().is_empty() {
                    problems.push(format!("{label}: probe.field is empty"));
                }
                check_duration(problems, &format!("{label}: probe.timeout"), timeout.as_deref());
            }
        }
    }

    /// Effective retry bounds, falling back to `[defaults]` and then the
    /// built-in defaults.
    pub fn retry_settings(&self, defaults: &DefaultsConfig) -> ConfigResult<RetrySettings> {
        let own = self.retry.clone().unwrap_or_default();

        let max_attempts = own
            .max_attempts
            .or(defaults.max_attempts)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        let interval = optional_duration(own.interval.as_deref().or(defaults.interval.as_deref()))?
            .unwrap_or(DEFAULT_INTERVAL);
        let total_budget = optional_duration(
            own.total_budget
                .as_deref()
                .or(defaults.total_budget.as_deref()),
        )?;

        Ok(RetrySettings {
            max_attempts,
            interval,
            total_budget,
        })
    }

    /// Ceiling for the startup action. Services without one get no action at all.
    pub fn startup_timeout(&self, defaults: &DefaultsConfig) -> ConfigResult<Duration> {
        let own = self.startup.as_ref().and_then(|s| s.timeout.as_deref());
        Ok(optional_duration(own.or(defaults.startup_timeout.as_deref()))?
            .unwrap_or(DEFAULT_STARTUP_TIMEOUT))
    }
}

impl ProbeConfig {
    pub fn timeout(&self, defaults: &DefaultsConfig) -> ConfigResult<Duration> {
        let own = match self {
            ProbeConfig::Http { timeout, .. }
            | ProbeConfig::Tcp { timeout, .. }
            | ProbeConfig::Container { timeout, .. } => timeout.as_deref(),
        };
        Ok(optional_duration(own.or(defaults.probe_timeout.as_deref()))?
            .unwrap_or(DEFAULT_PROBE_TIMEOUT))
    }

    /// Runtime query argv for a container probe.
    pub fn container_command(command: &[String], service: Option<&str>) -> Vec<String> {
        if !command.is_empty() {
            return command.to_vec();
        }
        let mut argv: Vec<String> = ["docker", "compose", "ps", "--format", "json"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if let Some(service) = service {
            argv.push(service.to_string());
        }
        argv
    }
}

fn optional_duration(value: Option<&str>) -> ConfigResult<Option<Duration>> {
    value.map(parse_duration).transpose()
}

fn check_duration(problems: &mut Vec<String>, what: &str, value: Option<&str>) {
    if let Some(raw) = value {
        if parse_duration(raw).is_err() {
            problems.push(format!("{what}: invalid duration '{raw}'"));
        }
    }
}
