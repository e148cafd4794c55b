//! Proposal synthesis: correlated insight groups → [`GrowthProposal`]s.
//!
//! Insights are grouped by `insight_type`. A group whose mean strength reaches the
//! significance threshold yields exactly one proposal targeting the profile section
//! of its evolution category, under `<section>.adaptations.<insight_type>`.

use chrono::Utc;
use serde_json::{json, Value};

use crate::error::{EvolutionError, Result};
use crate::ids;
use crate::patterns::PatternTrend;
use crate::types::{
    Complexity, EvolutionInsight, EvolutionType, GrowthProposal, ImplementationStatus,
    PatternOutcome, Priority, ProposedChanges, RiskLevel,
};

/// Risk and complexity policy: base values per category, raised by the number of
/// profile paths a proposal touches (≤3 base, 4–5 complexity raised, ≥6 both raised).
pub fn assess(evolution_type: EvolutionType, paths_touched: usize) -> (RiskLevel, Complexity) {
    let risk = evolution_type.base_risk();
    let complexity = evolution_type.base_complexity();
    match paths_touched {
        0..=3 => (risk, complexity),
        4..=5 => (risk, complexity.raised()),
        _ => (risk.raised(), complexity.raised()),
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

pub struct ProposalSynthesizer {
    significance_threshold: f64,
}

impl ProposalSynthesizer {
    pub fn new(significance_threshold: f64) -> Self {
        Self {
            significance_threshold,
        }
    }

    /// One proposal per significant insight-type group, in first-seen order.
    pub fn synthesize(&self, insights: &[EvolutionInsight]) -> Result<Vec<GrowthProposal>> {
        let mut groups: Vec<(String, Vec<EvolutionInsight>)> = Vec::new();
        for insight in insights {
            match groups.iter_mut().find(|(t, _)| *t == insight.insight_type) {
                Some((_, group)) => group.push(insight.clone()),
                None => groups.push((insight.insight_type.clone(), vec![insight.clone()])),
            }
        }
        let mut proposals = Vec::new();
        for (_, group) in groups {
            if let Some(p) = self.synthesize_group(&group, None)? {
                proposals.push(p);
            }
        }
        Ok(proposals)
    }

    /// Synthesize from one correlated group. `trend` marks a long-horizon group from
    /// the pattern library and is recorded in the change set.
    pub fn synthesize_group(
        &self,
        group: &[EvolutionInsight],
        trend: Option<&PatternTrend>,
    ) -> Result<Option<GrowthProposal>> {
        let Some(first) = group.first() else {
            return Ok(None);
        };
        let insight_type = first.insight_type.as_str();
        for insight in group {
            if insight.insight_type != insight_type {
                return Err(EvolutionError::AnalysisFailure(format!(
                    "mixed insight types in one group: '{}' vs '{}'",
                    insight_type, insight.insight_type
                )));
            }
            if !insight.pattern_strength.is_finite()
                || !(0.0..=1.0).contains(&insight.pattern_strength)
            {
                return Err(EvolutionError::AnalysisFailure(format!(
                    "insight {} has pattern_strength {} outside [0,1]",
                    insight.insight_id, insight.pattern_strength
                )));
            }
        }

        let confidence = (group.iter().map(|i| i.pattern_strength).sum::<f64>()
            / group.len() as f64)
            .clamp(0.0, 1.0);
        if confidence < self.significance_threshold {
            return Ok(None);
        }

        let evolution_type = EvolutionType::for_insight_type(insight_type);
        let target = evolution_type.target_component();
        let base = format!("{}.adaptations.{}", target, insight_type);

        let mut changes = ProposedChanges::new();
        changes.insert(format!("{}.weight", base), json!(round3(confidence)));
        changes.insert(format!("{}.evidence_count", base), json!(group.len()));
        let mode = match first.outcome {
            PatternOutcome::Success => "reinforce",
            PatternOutcome::Failure => "correct",
        };
        changes.insert(format!("{}.mode", base), json!(mode));

        let mut directives: Vec<&str> = Vec::new();
        for implication in group.iter().flat_map(|i| i.implications.iter()) {
            if !directives.contains(&implication.as_str()) {
                directives.push(implication);
            }
        }
        if !directives.is_empty() {
            changes.insert(format!("{}.directives", base), json!(directives));
        }
        if let Some(t) = trend {
            changes.insert(
                format!("{}.trend", base),
                json!({
                    "samples": t.count,
                    "mean": round3(t.mean_strength),
                    "median": round3(t.median_strength),
                }),
            );
        }

        let (risk, complexity) = assess(evolution_type, changes.len());
        let priority = Priority::assign(confidence, risk);
        let title = format!("{}: {}", evolution_type, insight_type);
        let description = format!(
            "{} insight(s) of type '{}' with mean strength {:.2}: {}",
            group.len(),
            insight_type,
            confidence,
            group
                .iter()
                .map(|i| i.description.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        );
        let supporting_evidence: Vec<Value> = group
            .iter()
            .map(|i| {
                json!({
                    "insight_id": i.insight_id,
                    "insight_type": i.insight_type,
                    "pattern_strength": i.pattern_strength,
                    "timestamp": i.timestamp,
                })
            })
            .collect();

        Ok(Some(GrowthProposal {
            proposal_id: ids::proposal_id(&title),
            evolution_type,
            priority,
            title,
            description,
            target_component: target.to_string(),
            proposed_changes: changes,
            supporting_evidence,
            confidence_score: confidence,
            risk_assessment: risk,
            implementation_complexity: complexity,
            created_timestamp: Utc::now(),
            votes_for: 0,
            votes_against: 0,
            implementation_status: ImplementationStatus::Proposed,
        }))
    }
}
