//! Drive the `shipgate` binary end to end against local TCP listeners.

use std::net::TcpListener;
use std::path::Path;
use std::process::{Command, Output};

fn shipgate(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_shipgate"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "off")
        .env_remove("SHIPGATE_TEST_MISSING_TOKEN")
        .output()
        .expect("run shipgate")
}

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("shipgate.toml");
    std::fs::write(&path, body).unwrap();
    path
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// A port nothing listens on.
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn stack(db_port: u16, api_port: u16) -> String {
    format!(
        r#"
[rollout]
name = "demo"

[defaults]
max_attempts = 2
interval = "100ms"

[[service]]
name = "api"
depends_on = ["db"]
probe = {{ kind = "tcp", address = "127.0.0.1:{api_port}" }}

[[service]]
name = "db"
probe = {{ kind = "tcp", address = "127.0.0.1:{db_port}" }}

[[env_file]]
path = "generated/.env"
vars = {{ DATABASE_URL = "postgres://127.0.0.1:{db_port}/app" }}
"#
    )
}

#[test]
fn validate_prints_the_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &stack(5432, 8080));

    let out = shipgate(&config, &["validate"]);

    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stdout(&out).contains("db → api"), "{}", stdout(&out));
}

#[test]
fn plan_lists_one_service_per_line() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &stack(5432, 8080));

    let out = shipgate(&config, &["plan"]);

    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "db\napi\n");
}

#[test]
fn cycle_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
[rollout]
name = "loop"

[[service]]
name = "a"
depends_on = ["b"]
probe = { kind = "tcp", address = "127.0.0.1:1" }

[[service]]
name = "b"
depends_on = ["a"]
probe = { kind = "tcp", address = "127.0.0.1:1" }
"#,
    );

    let out = shipgate(&config, &["rollout"]);

    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("dependency cycle: a -> b -> a"), "{}", stderr(&out));
}

#[test]
fn missing_required_env_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
[rollout]
name = "secrets"
required_env = ["SHIPGATE_TEST_MISSING_TOKEN"]
"#,
    );

    let out = shipgate(&config, &["validate"]);

    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("SHIPGATE_TEST_MISSING_TOKEN is not set"), "{}", stderr(&out));
}

#[test]
fn rollout_reports_healthy_services_and_writes_env_files() {
    let db = TcpListener::bind("127.0.0.1:0").unwrap();
    let api = TcpListener::bind("127.0.0.1:0").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        &stack(db.local_addr().unwrap().port(), api.local_addr().unwrap().port()),
    );

    let out = shipgate(&config, &["rollout", "--format", "lines"]);

    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));
    assert_eq!(stdout(&out), "db\tHealthy\t-\napi\tHealthy\t-\n");

    let env_file = dir.path().join("generated/.env");
    let rendered = std::fs::read_to_string(&env_file).unwrap();
    assert!(rendered.contains("DATABASE_URL=postgres://127.0.0.1:"), "{rendered}");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&env_file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[test]
fn rollout_fails_dependents_of_an_unreachable_service() {
    let api = TcpListener::bind("127.0.0.1:0").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        &stack(closed_port(), api.local_addr().unwrap().port()),
    );

    let out = shipgate(&config, &["rollout", "--format", "lines", "--skip-env-files"]);

    assert_eq!(out.status.code(), Some(1), "{}", stderr(&out));
    assert_eq!(
        stdout(&out),
        "db\tTimedOut\ttimeout\napi\tFailed\tdependency unhealthy\n"
    );
    assert!(!dir.path().join("generated/.env").exists());
}

#[test]
fn status_probes_without_gating() {
    let api = TcpListener::bind("127.0.0.1:0").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        &stack(closed_port(), api.local_addr().unwrap().port()),
    );

    let out = shipgate(&config, &["status", "--format", "json"]);

    assert_eq!(out.status.code(), Some(1), "{}", stderr(&out));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let entries = report["entries"].as_array().unwrap();
    assert_eq!(entries[0]["name"], "db");
    assert_eq!(entries[0]["state"], "failed");
    assert_eq!(entries[1]["name"], "api");
    assert_eq!(entries[1]["state"], "healthy");
}

#[cfg(unix)]
#[test]
fn failing_startup_command_exits_one() {
    let db = TcpListener::bind("127.0.0.1:0").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        &format!(
            r#"
[rollout]
name = "broken-start"

[[service]]
name = "db"
startup = {{ command = ["sh", "-c", "echo compose exploded >&2; exit 3"] }}
probe = {{ kind = "tcp", address = "{}" }}
"#,
            db.local_addr().unwrap()
        ),
    );

    let out = shipgate(&config, &["rollout", "--format", "lines"]);

    assert_eq!(out.status.code(), Some(1), "{}", stderr(&out));
    let line = stdout(&out);
    assert!(line.starts_with("db\tFailed\tstartup failed:"), "{line}");
    assert!(line.contains("compose exploded"), "{line}");
}

#[test]
fn render_writes_into_out_dir() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &stack(5432, 8080));

    let out = shipgate(&config, &["render", "--out-dir", out_dir.path().to_str().unwrap()]);

    assert!(out.status.success(), "{}", stderr(&out));
    assert!(out_dir.path().join("generated/.env").exists());
    assert!(!dir.path().join("generated/.env").exists());
}

#[cfg(unix)]
#[test]
fn bad_probe_url_is_rejected_before_startup() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("started");
    let config = write_config(
        dir.path(),
        &format!(
            r#"
[rollout]
name = "tls"

[[service]]
name = "api"
startup = {{ command = ["touch", "{}"] }}
probe = {{ kind = "http", url = "https://api.internal/health" }}
"#,
            marker.display()
        ),
    );

    let out = shipgate(&config, &["rollout"]);

    assert_eq!(out.status.code(), Some(2), "{}", stderr(&out));
    assert!(stderr(&out).contains("unsupported scheme 'https'"), "{}", stderr(&out));
    assert!(!marker.exists());
}
