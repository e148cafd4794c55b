//! Genesis growth loop.
//!
//! Watches an agent's interaction history, extracts behavioral insights, turns them
//! into growth proposals against a versioned profile, gates them through
//! priority-weighted voting and applies approved ones to a live copy of the profile.
//! The original profile is kept untouched; the live one is always the original plus
//! the recorded history.
//!
//! ```text
//! interactions → InsightExtractor → PatternLibrary → ProposalSynthesizer
//!              → ConsensusGate → EvolutionEngine::apply → profile + history
//! ```

pub mod consensus;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod history;
pub mod ids;
pub mod patterns;
pub mod profile;
pub mod scheduler;
pub mod seed;
pub mod synth;
pub mod types;

pub use consensus::{voting_threshold, ConsensusGate, VoteOutcome};
pub use engine::{
    BehavioralAnalytics, CycleKind, CycleReport, CycleStats, EngineBuilder, EngineStatus,
    EvolutionEngine, VoteReceipt,
};
pub use error::{EvolutionError, Result};
pub use extractor::{ExtractionRule, InsightExtractor, Matcher};
pub use history::{
    HistoryEvent, HistoryRecord, HistorySink, ImplementedChange, JsonlHistorySink,
    RejectedProposal, RejectionReason, RollbackTarget, SqliteHistorySink,
};
pub use patterns::{PatternLibrary, PatternTrend};
pub use profile::{Profile, ProfileDiff};
pub use scheduler::{spawn_scheduler, SchedulerHandle};
pub use synth::ProposalSynthesizer;
pub use types::{
    Complexity, EvolutionInsight, EvolutionType, GrowthProposal, ImplementationStatus,
    Interaction, PatternOutcome, Priority, RiskLevel,
};
