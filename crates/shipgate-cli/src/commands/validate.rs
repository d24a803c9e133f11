use std::path::Path;
use std::process::ExitCode;

use shipgate_rollout::{build_services, RolloutPlan};

pub fn validate(config_path: &Path) -> anyhow::Result<ExitCode> {
    let loaded = super::load(config_path)?;
    let nodes = build_services(&loaded.config, &loaded.base_dir)?;
    let plan = RolloutPlan::build(&nodes)?;

    println!(
        "✓ {} is valid: rollout '{}', {} services, {} env files",
        config_path.display(),
        loaded.config.rollout.name,
        plan.len(),
        loaded.config.env_files.len()
    );
    println!("  order: {}", plan.order().join(" → "));
    Ok(ExitCode::SUCCESS)
}
