//! Build service nodes from a `shipgate.toml`.

use std::path::Path;

use shipgate_core::{
    ConfigError, ConfigResult, DefaultsConfig, ProbeConfig, ServiceConfig, ShipgateConfig,
};
use shipgate_health::{ContainerProbe, HealthProbe, HttpProbe, RetryPolicy, TcpProbe};

use crate::action::{CommandAction, NoopAction, StartupAction};
use crate::node::ServiceNode;

/// One node per `[[service]]`, in declaration order.
///
/// Relative startup working directories resolve against `base_dir`
/// (normally the directory holding the config file). Probe targets that
/// can never work (bad URL, address without a port) are collected and
/// reported together as a pre-flight error.
pub fn build_services(config: &ShipgateConfig, base_dir: &Path) -> ConfigResult<Vec<ServiceNode>> {
    let mut nodes = Vec::with_capacity(config.services.len());
    let mut problems = Vec::new();
    for service in &config.services {
        let node = build_service(service, &config.defaults, base_dir)?;
        if let Err(reason) = validate_probe(&service.probe) {
            problems.push(format!("service '{}': {reason}", service.name));
        }
        nodes.push(node);
    }

    if problems.is_empty() {
        Ok(nodes)
    } else {
        Err(ConfigError::Preflight { problems })
    }
}

/// Container queries are only checked when they run.
fn validate_probe(probe: &ProbeConfig) -> Result<(), String> {
    match probe {
        ProbeConfig::Http { url, .. } => HttpProbe::new(url.as_str()).validate(),
        ProbeConfig::Tcp { address, .. } => TcpProbe::new(address.as_str()).validate(),
        ProbeConfig::Container { .. } => Ok(()),
    }
}

fn build_service(
    service: &ServiceConfig,
    defaults: &DefaultsConfig,
    base_dir: &Path,
) -> ConfigResult<ServiceNode> {
    let settings = service.retry_settings(defaults)?;
    let mut retry = RetryPolicy::new(settings.max_attempts, settings.interval);
    if let Some(budget) = settings.total_budget {
        retry = retry.with_total_budget(budget);
    }

    let probe = build_probe(&service.probe, defaults)?;

    let action: Box<dyn StartupAction> = match &service.startup {
        Some(startup) => {
            let mut action = CommandAction::new(startup.command.clone()).with_env(startup.env.clone());
            if let Some(dir) = &startup.working_dir {
                action = action.with_working_dir(base_dir.join(dir));
            }
            Box::new(action)
        }
        None => Box::new(NoopAction),
    };

    Ok(ServiceNode::new(&service.name, probe)
        .with_dependencies(service.depends_on.iter().cloned())
        .with_action(action)
        .with_retry(retry)
        .with_startup_timeout(service.startup_timeout(defaults)?))
}

fn build_probe(probe: &ProbeConfig, defaults: &DefaultsConfig) -> ConfigResult<Box<dyn HealthProbe>> {
    let timeout = probe.timeout(defaults)?;
    let probe: Box<dyn HealthProbe> = match probe {
        ProbeConfig::Http {
            url, expect_status, ..
        } => Box::new(
            HttpProbe::new(url.as_str())
                .with_expected_status(*expect_status)
                .with_timeout(timeout),
        ),
        ProbeConfig::Tcp { address, .. } => {
            Box::new(TcpProbe::new(address.as_str()).with_timeout(timeout))
        }
        ProbeConfig::Container {
            command,
            service,
            field,
            expected,
            ..
        } => Box::new(
            ContainerProbe::new(ProbeConfig::container_command(command, service.as_deref()))
                .with_field(field.as_str())
                .with_expected(expected.as_str())
                .with_timeout(timeout),
        ),
    };
    Ok(probe)
}
