//! Configuration structs grouped by concern.
//!
//! Loaded from environment variables with uniform fallback handling.

use std::path::PathBuf;
use std::time::Duration;

use super::env_keys::{evolution as evo_keys, observability as obv_keys, paths as path_keys};
use super::loader::{env_bool, env_optional, env_or, env_parse};

/// Which scheduled cycles are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvolutionMode {
    #[default]
    All,
    RapidOnly,
    Disabled,
}

impl EvolutionMode {
    pub fn from_env() -> Self {
        Self::parse(env_optional(evo_keys::GENESIS_EVOLUTION, &[]).as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            None | Some("1") | Some("true") | Some("all") => Self::All,
            Some("0") | Some("false") => Self::Disabled,
            Some("rapid") | Some("rapid-only") => Self::RapidOnly,
            Some(other) => {
                tracing::warn!(
                    "Unknown GENESIS_EVOLUTION value '{}', defaulting to all",
                    other
                );
                Self::All
            }
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    pub fn rapid_enabled(&self) -> bool {
        matches!(self, Self::All | Self::RapidOnly)
    }

    pub fn standard_enabled(&self) -> bool {
        matches!(self, Self::All)
    }

    pub fn deep_enabled(&self) -> bool {
        matches!(self, Self::All)
    }
}

/// Cadence of the three periodic analysis cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleIntervals {
    pub rapid: Duration,
    pub standard: Duration,
    pub deep: Duration,
}

impl Default for CycleIntervals {
    fn default() -> Self {
        Self {
            rapid: Duration::from_secs(30),
            standard: Duration::from_secs(300),
            deep: Duration::from_secs(1800),
        }
    }
}

impl CycleIntervals {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            rapid: Duration::from_secs(env_parse(
                evo_keys::GENESIS_RAPID_INTERVAL_SECS,
                d.rapid.as_secs(),
            )),
            standard: Duration::from_secs(env_parse(
                evo_keys::GENESIS_STANDARD_INTERVAL_SECS,
                d.standard.as_secs(),
            )),
            deep: Duration::from_secs(env_parse(
                evo_keys::GENESIS_DEEP_INTERVAL_SECS,
                d.deep.as_secs(),
            )),
        }
    }
}

/// Tunables of the growth loop.
#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionConfig {
    pub mode: EvolutionMode,
    pub intervals: CycleIntervals,
    pub min_insight_strength: f64,
    pub min_sample_size: usize,
    pub significance_threshold: f64,
    /// Per-bucket retention of the pattern library (ring buffer).
    pub pattern_bucket_cap: usize,
    /// Interactions retained for analysis; the deep cycle reads all of them.
    pub interaction_window_cap: usize,
    pub rapid_window: usize,
    pub standard_window: usize,
    pub max_pending_age: Duration,
    pub max_active_proposals: usize,
    pub auto_apply: bool,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            mode: EvolutionMode::All,
            intervals: CycleIntervals::default(),
            min_insight_strength: 0.3,
            min_sample_size: 3,
            significance_threshold: 0.3,
            pattern_bucket_cap: 256,
            interaction_window_cap: 5000,
            rapid_window: 50,
            standard_window: 500,
            max_pending_age: Duration::from_secs(86_400),
            max_active_proposals: 64,
            auto_apply: true,
        }
    }
}

impl EvolutionConfig {
    /// Load from env (reads `.env` first); unset keys keep their defaults.
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        let d = Self::default();
        let cfg = Self {
            mode: EvolutionMode::from_env(),
            intervals: CycleIntervals::from_env(),
            min_insight_strength: env_parse(
                evo_keys::GENESIS_MIN_INSIGHT_STRENGTH,
                d.min_insight_strength,
            ),
            min_sample_size: env_parse(evo_keys::GENESIS_MIN_SAMPLE_SIZE, d.min_sample_size),
            significance_threshold: env_parse(
                evo_keys::GENESIS_SIGNIFICANCE_THRESHOLD,
                d.significance_threshold,
            ),
            pattern_bucket_cap: env_parse(
                evo_keys::GENESIS_PATTERN_BUCKET_CAP,
                d.pattern_bucket_cap,
            ),
            interaction_window_cap: env_parse(
                evo_keys::GENESIS_INTERACTION_WINDOW_CAP,
                d.interaction_window_cap,
            ),
            rapid_window: env_parse(evo_keys::GENESIS_RAPID_WINDOW, d.rapid_window),
            standard_window: env_parse(evo_keys::GENESIS_STANDARD_WINDOW, d.standard_window),
            max_pending_age: Duration::from_secs(env_parse(
                evo_keys::GENESIS_MAX_PENDING_AGE_SECS,
                d.max_pending_age.as_secs(),
            )),
            max_active_proposals: env_parse(
                evo_keys::GENESIS_MAX_ACTIVE_PROPOSALS,
                d.max_active_proposals,
            ),
            auto_apply: env_bool(evo_keys::GENESIS_AUTO_APPLY, &[], d.auto_apply),
        };
        cfg.sanitized()
    }

    /// Clamp out-of-range values instead of failing startup.
    pub fn sanitized(mut self) -> Self {
        self.min_insight_strength = clamp_unit(self.min_insight_strength);
        self.significance_threshold = clamp_unit(self.significance_threshold);
        self.min_sample_size = self.min_sample_size.max(1);
        self.pattern_bucket_cap = self.pattern_bucket_cap.max(1);
        self.interaction_window_cap = self.interaction_window_cap.max(1);
        self.rapid_window = self.rapid_window.clamp(1, self.interaction_window_cap);
        self.standard_window = self.standard_window.clamp(1, self.interaction_window_cap);
        self.max_active_proposals = self.max_active_proposals.max(1);
        self
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Data directory and history locations.
#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub profile: Option<PathBuf>,
    pub history_log: PathBuf,
    pub history_db: PathBuf,
}

impl PathsConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        let data_dir = env_optional(path_keys::GENESIS_DATA_DIR, &[])
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".genesis")
            });
        let profile = env_optional(path_keys::GENESIS_PROFILE, &[]).map(PathBuf::from);
        let history_log = env_optional(path_keys::GENESIS_HISTORY_LOG, &[])
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("history").join("changelog.jsonl"));
        let history_db = env_optional(path_keys::GENESIS_HISTORY_DB, &[])
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("history").join("evolution.sqlite"));
        Self {
            data_dir,
            profile,
            history_log,
            history_db,
        }
    }
}

/// Default tracing directives: every workspace crate at info.
pub const DEFAULT_LOG_LEVEL: &str = "genesis=info,genesis_core=info,genesis_evolution=info";

/// Observability: quiet, log_level, log_json, audit_log
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
    pub audit_log: Option<String>,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            super::loader::load_dotenv();
            Self {
                quiet: env_bool(obv_keys::GENESIS_QUIET, &[], false),
                log_level: env_or(
                    obv_keys::GENESIS_LOG_LEVEL,
                    obv_keys::LOG_LEVEL_ALIASES,
                    || DEFAULT_LOG_LEVEL.to_string(),
                ),
                log_json: env_bool(obv_keys::GENESIS_LOG_JSON, &[], false),
                audit_log: env_optional(obv_keys::GENESIS_AUDIT_LOG, &[]),
            }
        })
    }
}
