//! Startup actions.
//!
//! An action brings a service up (e.g. `docker compose up -d web`). The
//! executor runs it at most once per rollout, so it must tolerate being
//! run again by the next rollout while the service is already up.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use shipgate_health::BoxFuture;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::ActionError;

/// Keep error details readable when a command dumps a lot of output.
const STDERR_TAIL_BYTES: usize = 512;

pub trait StartupAction: Send + Sync {
    /// Bring the service up. Resolves once the action has finished, not
    /// once the service is healthy.
    fn start(&self) -> BoxFuture<'_, Result<(), ActionError>>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

/// For services that are already running; only the probe matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAction;

impl StartupAction for NoopAction {
    fn start(&self) -> BoxFuture<'_, Result<(), ActionError>> {
        Box::pin(async { Ok(()) })
    }

    fn describe(&self) -> String {
        "none".to_string()
    }
}

/// Run an external command; success iff it exits 0.
#[derive(Debug, Clone)]
pub struct CommandAction {
    argv: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl CommandAction {
    /// `argv[0]` is looked up on `PATH`; the rest are passed as-is.
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    /// Extra variables, layered over the inherited environment.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Directory to run in. Defaults to the current one.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    async fn run(&self) -> Result<(), ActionError> {
        let (program, args) = self.argv.split_first().ok_or(ActionError::EmptyCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        info!(command = %self.describe(), "running startup command");
        let output = cmd.output().await.map_err(|source| ActionError::Spawn {
            program: program.clone(),
            source,
        })?;

        if output.status.success() {
            debug!(command = %self.describe(), "startup command succeeded");
            Ok(())
        } else {
            Err(ActionError::Exited {
                status: output.status.code(),
                stderr: tail(&output.stderr),
            })
        }
    }
}

impl StartupAction for CommandAction {
    fn start(&self) -> BoxFuture<'_, Result<(), ActionError>> {
        Box::pin(self.run())
    }

    fn describe(&self) -> String {
        self.argv.join(" ")
    }
}

fn tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", &text[start..])
}
