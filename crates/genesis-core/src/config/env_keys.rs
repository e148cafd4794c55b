//! Environment variable key constants.
//!
//! Primary keys use the `GENESIS_*` prefix.

/// Paths and data directory
pub mod paths {
    pub const GENESIS_DATA_DIR: &str = "GENESIS_DATA_DIR";
    /// Baseline profile document (JSON). Falls back to the bundled seed profile.
    pub const GENESIS_PROFILE: &str = "GENESIS_PROFILE";
    /// Append-only JSONL history (changelog).
    pub const GENESIS_HISTORY_LOG: &str = "GENESIS_HISTORY_LOG";
    /// SQLite history database.
    pub const GENESIS_HISTORY_DB: &str = "GENESIS_HISTORY_DB";
}

/// Observability and logging
pub mod observability {
    pub const GENESIS_QUIET: &str = "GENESIS_QUIET";
    pub const GENESIS_LOG_LEVEL: &str = "GENESIS_LOG_LEVEL";
    pub const LOG_LEVEL_ALIASES: &[&str] = &["RUST_LOG_LEVEL"];
    pub const GENESIS_LOG_JSON: &str = "GENESIS_LOG_JSON";
    pub const GENESIS_AUDIT_LOG: &str = "GENESIS_AUDIT_LOG";
}

/// Evolution engine
pub mod evolution {
    /// Evolution mode: "1" (default, all cycles), "rapid" (rapid cycle only), "0" (disabled).
    pub const GENESIS_EVOLUTION: &str = "GENESIS_EVOLUTION";

    /// Cycle cadence in seconds. Defaults 30 / 300 / 1800.
    pub const GENESIS_RAPID_INTERVAL_SECS: &str = "GENESIS_RAPID_INTERVAL_SECS";
    pub const GENESIS_STANDARD_INTERVAL_SECS: &str = "GENESIS_STANDARD_INTERVAL_SECS";
    pub const GENESIS_DEEP_INTERVAL_SECS: &str = "GENESIS_DEEP_INTERVAL_SECS";

    /// Insights weaker than this are never emitted. Default 0.3.
    pub const GENESIS_MIN_INSIGHT_STRENGTH: &str = "GENESIS_MIN_INSIGHT_STRENGTH";
    /// Minimum applicable interactions before a rule may fire. Default 3.
    pub const GENESIS_MIN_SAMPLE_SIZE: &str = "GENESIS_MIN_SAMPLE_SIZE";
    /// Mean group strength required to synthesize a proposal. Default 0.3.
    pub const GENESIS_SIGNIFICANCE_THRESHOLD: &str = "GENESIS_SIGNIFICANCE_THRESHOLD";

    pub const GENESIS_PATTERN_BUCKET_CAP: &str = "GENESIS_PATTERN_BUCKET_CAP";
    pub const GENESIS_INTERACTION_WINDOW_CAP: &str = "GENESIS_INTERACTION_WINDOW_CAP";
    pub const GENESIS_RAPID_WINDOW: &str = "GENESIS_RAPID_WINDOW";
    pub const GENESIS_STANDARD_WINDOW: &str = "GENESIS_STANDARD_WINDOW";

    /// Proposals pending longer than this are rejected by standard/deep cycles. Default 86400.
    pub const GENESIS_MAX_PENDING_AGE_SECS: &str = "GENESIS_MAX_PENDING_AGE_SECS";
    pub const GENESIS_MAX_ACTIVE_PROPOSALS: &str = "GENESIS_MAX_ACTIVE_PROPOSALS";
    /// Apply proposals as soon as they are voted into `approved`. Default true.
    pub const GENESIS_AUTO_APPLY: &str = "GENESIS_AUTO_APPLY";
}
