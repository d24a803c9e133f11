use std::path::Path;
use std::process::ExitCode;

use shipgate_health::cancellation;
use shipgate_rollout::{build_services, RolloutExecutor, RolloutPlan};
use tracing::{info, warn};

pub async fn rollout(
    config_path: &Path,
    format: super::ReportFormat,
    skip_env_files: bool,
) -> anyhow::Result<ExitCode> {
    let loaded = super::load(config_path)?;
    let mut nodes = build_services(&loaded.config, &loaded.base_dir)?;
    let plan = RolloutPlan::build(&nodes)?;
    info!(
        rollout = %loaded.config.rollout.name,
        order = %plan.order().join(","),
        "plan ready"
    );

    if skip_env_files {
        info!("skipping env files");
    } else {
        super::render::write_all(&loaded.config, &loaded.base_dir)?;
    }

    let (handle, cancel) = cancellation();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling rollout");
            handle.cancel();
        }
    });

    let result = RolloutExecutor::new(cancel).execute(&plan, &mut nodes).await;
    interrupt.abort();
    let report = result?;

    super::print_report(&loaded.config.rollout.name, &report, format)?;
    Ok(ExitCode::from(report.exit_code()))
}
