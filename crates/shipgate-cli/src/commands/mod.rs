pub mod plan;
pub mod render;
pub mod rollout;
pub mod status;
pub mod validate;

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use shipgate_core::{ConfigError, ProcessEnv, ShipgateConfig};
use shipgate_rollout::{format_report, PlanError, RolloutError, VerificationReport};

/// Exit status for anything that stops a rollout before it starts.
pub const EXIT_CONFIG: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// `name<TAB>state<TAB>reason`, one service per line
    Lines,
    Json,
    Text,
}

pub struct Loaded {
    pub config: ShipgateConfig,
    /// Relative paths in the config resolve against this directory.
    pub base_dir: PathBuf,
}

pub fn load(path: &Path) -> anyhow::Result<Loaded> {
    let config = ShipgateConfig::load(path, &ProcessEnv)?;
    let base_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok(Loaded { config, base_dir })
}

pub fn print_report(
    title: &str,
    report: &VerificationReport,
    format: ReportFormat,
) -> anyhow::Result<()> {
    match format {
        ReportFormat::Lines => print!("{}", report.to_lines()),
        ReportFormat::Json => println!("{}", report.to_json()?),
        ReportFormat::Text => println!("{}", format_report(title, report)),
    }
    Ok(())
}

/// Configuration and planning problems exit 2; everything else exits 1.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    let config_problem = err.chain().any(|cause| {
        cause.is::<ConfigError>()
            || cause.is::<PlanError>()
            || matches!(
                cause.downcast_ref::<RolloutError>(),
                Some(RolloutError::Config(_) | RolloutError::Plan(_))
            )
    });
    if config_problem { EXIT_CONFIG } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_exit_two() {
        let err = anyhow::Error::new(ConfigError::Parse("bad".into()));
        assert_eq!(exit_code_for(&err), EXIT_CONFIG);

        let err = anyhow::Error::new(PlanError::DuplicateName("db".into()));
        assert_eq!(exit_code_for(&err), EXIT_CONFIG);

        let err = anyhow::Error::new(RolloutError::Plan(PlanError::DuplicateName("db".into())));
        assert_eq!(exit_code_for(&err), EXIT_CONFIG);
    }

    #[test]
    fn other_errors_exit_one() {
        let err = anyhow::Error::new(RolloutError::PlanMismatch("x".into()));
        assert_eq!(exit_code_for(&err), 1);
        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), 1);
    }

    #[test]
    fn load_resolves_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipgate.toml");
        std::fs::write(&path, "[rollout]\nname = \"x\"\n").unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.base_dir, dir.path());
        assert_eq!(loaded.config.rollout.name, "x");
    }
}
