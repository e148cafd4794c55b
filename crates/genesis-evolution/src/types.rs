//! Growth-loop data model: interactions, insights, proposals and their closed enums.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Profile path (dotted) → new value.
pub type ProposedChanges = BTreeMap<String, Value>;

// ─── Interaction records ─────────────────────────────────────────────────────

/// One telemetry event from the running agent. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub source: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: Value,
}

impl Interaction {
    pub fn new(source: &str, payload: Value) -> Self {
        Self {
            source: source.to_string(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn at(source: &str, timestamp: DateTime<Utc>, payload: Value) -> Self {
        Self {
            source: source.to_string(),
            timestamp,
            payload,
        }
    }
}

// ─── Insights ────────────────────────────────────────────────────────────────

/// Whether a detected pattern is something to reinforce or to correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternOutcome {
    Success,
    Failure,
}

impl PatternOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// A detected behavioral pattern with its strength. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionInsight {
    pub insight_id: String,
    pub insight_type: String,
    pub outcome: PatternOutcome,
    pub pattern_strength: f64,
    pub description: String,
    pub supporting_data: Vec<Value>,
    pub implications: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

// ─── Proposal enums ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionType {
    PersonalityRefinement,
    CapabilityExpansion,
    FusionEnhancement,
    EthicalDeepening,
    LearningOptimization,
    InteractionImprovement,
    PerformanceTuning,
    ConsciousnessExpansion,
}

impl EvolutionType {
    /// Category used for insight types the mapping does not recognize.
    pub const DEFAULT: Self = Self::LearningOptimization;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersonalityRefinement => "personality_refinement",
            Self::CapabilityExpansion => "capability_expansion",
            Self::FusionEnhancement => "fusion_enhancement",
            Self::EthicalDeepening => "ethical_deepening",
            Self::LearningOptimization => "learning_optimization",
            Self::InteractionImprovement => "interaction_improvement",
            Self::PerformanceTuning => "performance_tuning",
            Self::ConsciousnessExpansion => "consciousness_expansion",
        }
    }

    /// Total mapping from insight type to evolution category.
    pub fn for_insight_type(insight_type: &str) -> Self {
        match insight_type {
            "low_user_satisfaction" | "conversation_friction" => Self::InteractionImprovement,
            "high_user_satisfaction" | "tone_drift" => Self::PersonalityRefinement,
            "slow_response" | "resource_pressure" => Self::PerformanceTuning,
            "capability_gap" => Self::CapabilityExpansion,
            "ethical_concern" => Self::EthicalDeepening,
            "fusion_opportunity" => Self::FusionEnhancement,
            "self_reflection" => Self::ConsciousnessExpansion,
            "error_cluster" | "knowledge_gap" => Self::LearningOptimization,
            _ => Self::DEFAULT,
        }
    }

    /// Profile section a proposal of this category modifies.
    pub fn target_component(&self) -> &'static str {
        match self {
            Self::PersonalityRefinement => "personality",
            Self::CapabilityExpansion => "capabilities",
            Self::FusionEnhancement => "fusion_abilities",
            Self::EthicalDeepening => "ethical_foundation",
            Self::LearningOptimization => "learning",
            Self::InteractionImprovement => "interaction_style",
            Self::PerformanceTuning => "performance",
            Self::ConsciousnessExpansion => "consciousness",
        }
    }

    pub fn base_risk(&self) -> RiskLevel {
        match self {
            Self::InteractionImprovement | Self::PerformanceTuning | Self::LearningOptimization => {
                RiskLevel::Low
            }
            Self::PersonalityRefinement | Self::CapabilityExpansion | Self::FusionEnhancement => {
                RiskLevel::Medium
            }
            Self::EthicalDeepening | Self::ConsciousnessExpansion => RiskLevel::High,
        }
    }

    pub fn base_complexity(&self) -> Complexity {
        match self {
            Self::InteractionImprovement | Self::PerformanceTuning => Complexity::Trivial,
            Self::PersonalityRefinement | Self::LearningOptimization => Complexity::Moderate,
            Self::CapabilityExpansion
            | Self::FusionEnhancement
            | Self::EthicalDeepening
            | Self::ConsciousnessExpansion => Complexity::Complex,
        }
    }
}

impl fmt::Display for EvolutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
    Experimental,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Experimental => "experimental",
        }
    }

    /// critical: confidence >= 0.9 with low risk; experimental: confidence < 0.4;
    /// otherwise high / medium / low by confidence band.
    pub fn assign(confidence: f64, risk: RiskLevel) -> Self {
        if confidence >= 0.9 && risk == RiskLevel::Low {
            Self::Critical
        } else if confidence < 0.4 {
            Self::Experimental
        } else if confidence >= 0.75 {
            Self::High
        } else if confidence >= 0.55 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Surfaced by rapid cycles.
    pub fn is_urgent(&self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn raised(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Trivial,
    Moderate,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trivial => "trivial",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        }
    }

    pub fn raised(self) -> Self {
        match self {
            Self::Trivial => Self::Moderate,
            Self::Moderate | Self::Complex => Self::Complex,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImplementationStatus {
    Proposed,
    Approved,
    Implemented,
    Rejected,
}

impl ImplementationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Approved => "approved",
            Self::Implemented => "implemented",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Implemented | Self::Rejected)
    }
}

impl fmt::Display for ImplementationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Growth proposal ─────────────────────────────────────────────────────────

/// A voteable request to change one or more profile paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthProposal {
    pub proposal_id: String,
    pub evolution_type: EvolutionType,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub target_component: String,
    pub proposed_changes: ProposedChanges,
    pub supporting_evidence: Vec<Value>,
    pub confidence_score: f64,
    pub risk_assessment: RiskLevel,
    pub implementation_complexity: Complexity,
    pub created_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub votes_for: u32,
    #[serde(default)]
    pub votes_against: u32,
    pub implementation_status: ImplementationStatus,
}

impl GrowthProposal {
    /// Duplicate key: target component plus the exact change set.
    pub fn fingerprint(&self) -> String {
        let changes = serde_json::to_string(&self.proposed_changes).unwrap_or_default();
        format!("{}|{}", self.target_component, changes)
    }

    /// Signed vote margin in favor of the proposal.
    pub fn vote_margin(&self) -> i64 {
        i64::from(self.votes_for) - i64::from(self.votes_against)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_policy_bands() {
        assert_eq!(Priority::assign(0.95, RiskLevel::Low), Priority::Critical);
        assert_eq!(Priority::assign(0.95, RiskLevel::High), Priority::High);
        assert_eq!(Priority::assign(0.85, RiskLevel::Low), Priority::High);
        assert_eq!(Priority::assign(0.6, RiskLevel::Low), Priority::Medium);
        assert_eq!(Priority::assign(0.45, RiskLevel::Medium), Priority::Low);
        assert_eq!(Priority::assign(0.39, RiskLevel::Low), Priority::Experimental);
    }

    #[test]
    fn test_insight_mapping_is_total() {
        assert_eq!(
            EvolutionType::for_insight_type("low_user_satisfaction"),
            EvolutionType::InteractionImprovement
        );
        assert_eq!(
            EvolutionType::for_insight_type("never_seen_before"),
            EvolutionType::DEFAULT
        );
    }

    #[test]
    fn test_enum_serialization() {
        assert_eq!(
            serde_json::to_value(EvolutionType::ConsciousnessExpansion).unwrap(),
            "consciousness_expansion"
        );
        assert_eq!(serde_json::to_value(Priority::Experimental).unwrap(), "experimental");
        assert_eq!(serde_json::to_value(ImplementationStatus::Approved).unwrap(), "approved");
    }

    #[test]
    fn test_interaction_defaults_timestamp() {
        let i: Interaction =
            serde_json::from_str(r#"{"source":"chat","payload":{"satisfaction":0.2}}"#).unwrap();
        assert_eq!(i.source, "chat");
        assert_eq!(i.payload["satisfaction"], 0.2);
    }
}
