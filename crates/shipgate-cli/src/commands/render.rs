use std::path::Path;
use std::process::ExitCode;

use shipgate_core::{write_env_file, ShipgateConfig};

pub fn render(config_path: &Path, out_dir: Option<&Path>) -> anyhow::Result<ExitCode> {
    let loaded = super::load(config_path)?;
    let dir = out_dir.unwrap_or(&loaded.base_dir);
    for path in write_all(&loaded.config, dir)? {
        println!("✓ Wrote {}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}

/// Write every `[[env_file]]`, stopping at the first failure.
pub fn write_all(config: &ShipgateConfig, dir: &Path) -> anyhow::Result<Vec<std::path::PathBuf>> {
    let mut written = Vec::with_capacity(config.env_files.len());
    for file in &config.env_files {
        written.push(write_env_file(dir, &config.rollout.name, file)?);
    }
    Ok(written)
}
