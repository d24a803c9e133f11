use std::path::Path;
use std::process::ExitCode;

use shipgate_rollout::{build_services, survey, RolloutPlan};

/// One probe per service in plan order; nothing is started.
pub async fn status(config_path: &Path, format: super::ReportFormat) -> anyhow::Result<ExitCode> {
    let loaded = super::load(config_path)?;
    let mut nodes = build_services(&loaded.config, &loaded.base_dir)?;
    let plan = RolloutPlan::build(&nodes)?;
    nodes.sort_by_key(|node| plan.position(node.name()));

    let report = survey(&nodes).await;
    super::print_report(&loaded.config.rollout.name, &report, format)?;
    Ok(ExitCode::from(report.exit_code()))
}
