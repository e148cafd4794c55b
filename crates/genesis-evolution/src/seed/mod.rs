//! Seed data: the baseline profile and the default extraction rule set.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::extractor::ExtractionRule;
use crate::profile::Profile;

const SEED_PROFILE: &str = include_str!("profile.seed.json");
const SEED_RULES: &str = include_str!("rules.seed.json");

/// Baseline profile used when no profile file is configured.
pub fn seed_profile() -> Result<Profile> {
    let value: serde_json::Value =
        serde_json::from_str(SEED_PROFILE).context("parsing bundled seed profile")?;
    Profile::new(value).map_err(Into::into)
}

pub fn seed_rules() -> Result<Vec<ExtractionRule>> {
    serde_json::from_str(SEED_RULES).context("parsing bundled seed rules")
}

pub fn load_profile(path: &Path) -> Result<Profile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading profile {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("parsing profile {}", path.display()))?;
    Profile::new(value).map_err(Into::into)
}

pub fn load_rules(path: &Path) -> Result<Vec<ExtractionRule>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading rules {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing rules {}", path.display()))
}

/// Write the bundled seed profile (and rules next to it as `rules.json`).
/// Existing files are kept unless `force` is set.
pub fn write_seed(profile_path: &Path, force: bool) -> Result<()> {
    if profile_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            profile_path.display()
        );
    }
    if let Some(parent) = profile_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    atomic_write(profile_path, SEED_PROFILE)?;
    let rules_path = profile_path.with_file_name("rules.json");
    if force || !rules_path.exists() {
        atomic_write(&rules_path, SEED_RULES)?;
    }
    tracing::info!("Seed profile written to {}", profile_path.display());
    Ok(())
}

fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EvolutionType;

    #[test]
    fn test_seed_profile_has_every_target_section() {
        let profile = seed_profile().unwrap();
        let sections = profile.sections();
        for t in [
            EvolutionType::PersonalityRefinement,
            EvolutionType::CapabilityExpansion,
            EvolutionType::FusionEnhancement,
            EvolutionType::EthicalDeepening,
            EvolutionType::LearningOptimization,
            EvolutionType::InteractionImprovement,
            EvolutionType::PerformanceTuning,
            EvolutionType::ConsciousnessExpansion,
        ] {
            let section = t.target_component();
            assert!(sections.iter().any(|s| s == section), "missing {}", section);
            assert!(profile.get(section).unwrap().is_object());
        }
    }

    #[test]
    fn test_seed_rules_parse_and_compile() {
        let rules = seed_rules().unwrap();
        assert_eq!(rules.len(), 8);
        let extractor = crate::extractor::InsightExtractor::new(rules, 0.3, 3).unwrap();
        assert_eq!(extractor.rule_count(), 8);
    }

    #[test]
    fn test_write_seed_respects_force() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("genesis").join("profile.json");
        write_seed(&path, false).unwrap();
        assert!(path.with_file_name("rules.json").exists());
        assert!(write_seed(&path, false).is_err());
        write_seed(&path, true).unwrap();

        let loaded = load_profile(&path).unwrap();
        assert_eq!(loaded, seed_profile().unwrap());
        assert_eq!(load_rules(&path.with_file_name("rules.json")).unwrap().len(), 8);
    }
}
