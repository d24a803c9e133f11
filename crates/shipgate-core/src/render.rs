//! Env-file templating.
//!
//! Rendering is a pure function of the typed config; writing is a separate
//! step so the text can be checked without touching the filesystem.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::EnvFileConfig;
use crate::error::{ConfigError, ConfigResult};

/// Render an env file as `KEY=value` lines, sorted by key.
pub fn render_env_file(rollout: &str, file: &EnvFileConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Generated by shipgate for rollout '{rollout}'. Do not edit.");
    for (key, value) in &file.vars {
        let _ = writeln!(out, "{key}={}", quote_value(value));
    }
    out
}

/// Write a rendered env file under `base_dir` and apply its mode.
///
/// The file is written to a sibling temp path first and renamed into place,
/// so readers never observe a partially written secret file.
pub fn write_env_file(base_dir: &Path, rollout: &str, file: &EnvFileConfig) -> ConfigResult<PathBuf> {
    let target = base_dir.join(&file.path);
    let write_err = |source| ConfigError::Write {
        path: target.clone(),
        source,
    };

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut tmp_name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".shipgate-tmp");
    let tmp = target.with_file_name(tmp_name);

    std::fs::write(&tmp, render_env_file(rollout, file)).map_err(write_err)?;
    set_mode(&tmp, file.mode).map_err(write_err)?;
    std::fs::rename(&tmp, &target).map_err(write_err)?;

    info!(
        path = %target.display(),
        vars = file.vars.len(),
        mode = %format!("{:o}", file.mode),
        "env file written"
    );
    Ok(target)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

fn quote_value(value: &str) -> String {
    let needs_quotes = value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '$' | '\\' | '`'));
    if !needs_quotes {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' | '\\' | '$' | '`' => {
                quoted.push('\\');
                quoted.push(c);
            }
            '\n' => quoted.push_str("\\n"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
