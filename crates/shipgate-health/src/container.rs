//! Container-runtime health probe.
//!
//! Runtimes disagree on the shape of their status output: `docker compose
//! ps --format json` prints one object per line on recent releases and a
//! JSON array on older ones, `docker inspect` prints an array, and custom
//! wrappers often print a bare object. [`health_field`] normalizes all of
//! these so callers only ever see "the field's value" or "nothing".

use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::probe::{BoxFuture, HealthProbe, ProbeOutcome, DEFAULT_PROBE_TIMEOUT};

/// `Healthy` iff the runtime reports `field == expected` for the unit.
#[derive(Debug, Clone)]
pub struct ContainerProbe {
    argv: Vec<String>,
    field: String,
    expected: String,
    timeout: Duration,
}

impl ContainerProbe {
    /// `argv` is the full status query, e.g. `["docker", "inspect", "web"]`.
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            field: "Health".to_string(),
            expected: "healthy".to_string(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Dotted path into the status object, e.g. `State.Health.Status`.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    /// Value of the field that counts as healthy.
    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = expected.into();
        self
    }

    /// Upper bound for one runtime query.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn probe(&self) -> ProbeOutcome {
        let Some((program, args)) = self.argv.split_first() else {
            return ProbeOutcome::Error("container probe has an empty runtime command".to_string());
        };

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ProbeOutcome::Error(format!("runtime command '{program}' not found"));
            }
            Err(e) => {
                debug!(error = %e, %program, "runtime status query failed to run");
                return ProbeOutcome::Unhealthy;
            }
        };

        if !output.status.success() {
            debug!(status = %output.status, %program, "runtime status query exited non-zero");
            return ProbeOutcome::Unhealthy;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match health_field(&stdout, &self.field) {
            Some(value) if value == self.expected => ProbeOutcome::Healthy,
            Some(value) => {
                debug!(field = %self.field, reported = %value, expected = %self.expected, "container not healthy yet");
                ProbeOutcome::Unhealthy
            }
            None => {
                debug!(field = %self.field, "health field absent from runtime output");
                ProbeOutcome::Unhealthy
            }
        }
    }
}

impl HealthProbe for ContainerProbe {
    fn check(&self) -> BoxFuture<'_, ProbeOutcome> {
        Box::pin(self.probe())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn describe(&self) -> String {
        format!("container {} ({}={})", self.argv.join(" "), self.field, self.expected)
    }
}

/// Extract a string field from runtime status output.
///
/// Accepts a single JSON object, a JSON array (first object wins), or
/// newline-delimited objects (first parsable object wins). `path` may be
/// dotted to reach nested fields. Returns `None` for anything else.
pub fn health_field(output: &str, path: &str) -> Option<String> {
    let status = first_status_object(output)?;
    let mut value = &status;
    for segment in path.split('.') {
        value = value.get(segment)?;
    }
    value.as_str().map(str::to_owned)
}

fn first_status_object(output: &str) -> Option<Value> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => items.into_iter().find(Value::is_object),
        Ok(object @ Value::Object(_)) => Some(object),
        Ok(_) => None,
        Err(_) => trimmed
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
            .find(Value::is_object),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_object() {
        let out = r#"{"Name":"web","Health":"healthy"}"#;
        assert_eq!(health_field(out, "Health").as_deref(), Some("healthy"));
    }

    #[test]
    fn array_of_objects() {
        let out = r#"[{"Name":"web","Health":"starting"},{"Name":"db","Health":"healthy"}]"#;
        assert_eq!(health_field(out, "Health").as_deref(), Some("starting"));
    }

    #[test]
    fn newline_delimited_objects() {
        let out = "{\"Name\":\"web\",\"Health\":\"healthy\"}\n{\"Name\":\"db\",\"Health\":\"\"}\n";
        assert_eq!(health_field(out, "Health").as_deref(), Some("healthy"));
    }

    #[test]
    fn nested_path_in_inspect_output() {
        let out = r#"[{"State":{"Status":"running","Health":{"Status":"healthy"}}}]"#;
        assert_eq!(health_field(out, "State.Health.Status").as_deref(), Some("healthy"));
        assert_eq!(health_field(out, "State.Health"), None);
    }

    #[test]
    fn absent_or_unparsable_is_none() {
        assert_eq!(health_field("", "Health"), None);
        assert_eq!(health_field("[]", "Health"), None);
        assert_eq!(health_field("\"healthy\"", "Health"), None);
        assert_eq!(health_field("no such service", "Health"), None);
        assert_eq!(health_field(r#"{"Name":"web"}"#, "Health"), None);
        assert_eq!(health_field(r#"{"Health":null}"#, "Health"), None);
    }

    #[tokio::test]
    async fn empty_command_is_error() {
        let probe = ContainerProbe::new(Vec::new());
        assert!(matches!(probe.check().await, ProbeOutcome::Error(_)));
    }

    #[tokio::test]
    async fn missing_runtime_binary_is_error() {
        let probe = ContainerProbe::new(vec!["shipgate-no-such-runtime-binary".to_string()]);
        assert!(matches!(probe.check().await, ProbeOutcome::Error(_)));
    }

    #[cfg(unix)]
    fn sh(script: &str) -> ContainerProbe {
        ContainerProbe::new(vec!["sh".to_string(), "-c".to_string(), script.to_string()])
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runtime_reports_healthy() {
        let probe = sh(r#"echo '[{"Service":"web","Health":"healthy"}]'"#);
        assert_eq!(probe.check().await, ProbeOutcome::Healthy);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runtime_reports_starting() {
        let probe = sh(r#"echo '{"Service":"web","Health":"starting"}'"#);
        assert_eq!(probe.check().await, ProbeOutcome::Unhealthy);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runtime_failure_is_unhealthy() {
        let probe = sh("echo 'no such service' >&2; exit 1");
        assert_eq!(probe.check().await, ProbeOutcome::Unhealthy);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn custom_field_and_expected_value() {
        let probe = sh(r#"echo '{"State":"running"}'"#)
            .with_field("State")
            .with_expected("running");
        assert_eq!(probe.check().await, ProbeOutcome::Healthy);
    }
}
