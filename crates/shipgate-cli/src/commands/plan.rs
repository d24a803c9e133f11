use std::path::Path;
use std::process::ExitCode;

use shipgate_rollout::RolloutPlan;

pub fn plan(config_path: &Path) -> anyhow::Result<ExitCode> {
    let loaded = super::load(config_path)?;
    let plan = RolloutPlan::build(&loaded.config.services)?;
    for name in plan.order() {
        println!("{name}");
    }
    Ok(ExitCode::SUCCESS)
}
