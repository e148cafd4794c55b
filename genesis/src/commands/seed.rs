use std::path::PathBuf;

use anyhow::Result;
use genesis_core::config::PathsConfig;
use genesis_evolution::seed;

/// `genesis seed`: write the bundled profile and rules.
pub fn cmd_seed(output: Option<PathBuf>, force: bool) -> Result<()> {
    let path = output.unwrap_or_else(|| PathsConfig::from_env().data_dir.join("profile.json"));
    seed::write_seed(&path, force)?;
    println!("Seed profile: {}", path.display());
    println!("Seed rules:   {}", path.with_file_name("rules.json").display());
    Ok(())
}
