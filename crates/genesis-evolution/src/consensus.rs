//! Consensus gate: priority-weighted vote thresholds and proposal expiry.
//!
//! Transitions are `proposed → approved | rejected` and `approved → implemented`.
//! Nothing here ever moves a proposal backwards.

use chrono::{DateTime, Duration, Utc};

use crate::error::{EvolutionError, Result};
use crate::types::{GrowthProposal, ImplementationStatus, Priority};

/// Net votes needed to approve (or reject) a proposal of the given priority.
pub fn voting_threshold(priority: Priority) -> u32 {
    match priority {
        Priority::Critical => 1,
        Priority::High => 2,
        Priority::Medium => 3,
        Priority::Low => 5,
        Priority::Experimental => 7,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteOutcome {
    Pending,
    Approved,
    Rejected,
}

/// Live proposals in creation order, unique by id.
#[derive(Debug, Default)]
pub struct ActiveProposals {
    items: Vec<GrowthProposal>,
}

impl ActiveProposals {
    pub fn get(&self, id: &str) -> Option<&GrowthProposal> {
        self.items.iter().find(|p| p.proposal_id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut GrowthProposal> {
        self.items.iter_mut().find(|p| p.proposal_id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Caller guarantees the id is not yet present.
    pub fn insert(&mut self, proposal: GrowthProposal) {
        self.items.push(proposal);
    }

    pub fn remove(&mut self, id: &str) -> Option<GrowthProposal> {
        let idx = self.items.iter().position(|p| p.proposal_id == id)?;
        Some(self.items.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &GrowthProposal> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&GrowthProposal> {
        self.items.first()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsensusGate;

impl ConsensusGate {
    /// Record one vote and update the proposal's status when a threshold is crossed.
    /// Removing decided proposals from the active set is the caller's job.
    pub fn record_vote(
        &self,
        active: &mut ActiveProposals,
        proposal_id: &str,
        approve: bool,
    ) -> Result<VoteOutcome> {
        let proposal = active
            .get_mut(proposal_id)
            .ok_or_else(|| EvolutionError::UnknownProposal(proposal_id.to_string()))?;
        if proposal.implementation_status != ImplementationStatus::Proposed {
            return Err(EvolutionError::InvalidState(format!(
                "proposal {} is {}, votes are only accepted while proposed",
                proposal_id, proposal.implementation_status
            )));
        }
        if approve {
            proposal.votes_for = proposal.votes_for.saturating_add(1);
        } else {
            proposal.votes_against = proposal.votes_against.saturating_add(1);
        }
        let outcome = self.evaluate(proposal);
        match outcome {
            VoteOutcome::Approved => proposal.implementation_status = ImplementationStatus::Approved,
            VoteOutcome::Rejected => proposal.implementation_status = ImplementationStatus::Rejected,
            VoteOutcome::Pending => {}
        }
        Ok(outcome)
    }

    pub fn evaluate(&self, proposal: &GrowthProposal) -> VoteOutcome {
        let threshold = i64::from(voting_threshold(proposal.priority));
        let margin = proposal.vote_margin();
        if margin >= threshold {
            VoteOutcome::Approved
        } else if -margin >= threshold {
            VoteOutcome::Rejected
        } else {
            VoteOutcome::Pending
        }
    }

    /// Pending proposals older than `max_age` are rejected by standard/deep cycles.
    pub fn is_expired(&self, proposal: &GrowthProposal, now: DateTime<Utc>, max_age: Duration) -> bool {
        proposal.implementation_status == ImplementationStatus::Proposed
            && now.signed_duration_since(proposal.created_timestamp) > max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Complexity, EvolutionType, ProposedChanges, RiskLevel};

    fn proposal(id: &str, priority: Priority) -> GrowthProposal {
        GrowthProposal {
            proposal_id: id.into(),
            evolution_type: EvolutionType::PerformanceTuning,
            priority,
            title: "performance_tuning: slow_response".into(),
            description: String::new(),
            target_component: "performance".into(),
            proposed_changes: ProposedChanges::new(),
            supporting_evidence: vec![],
            confidence_score: 0.6,
            risk_assessment: RiskLevel::Low,
            implementation_complexity: Complexity::Trivial,
            created_timestamp: Utc::now(),
            votes_for: 0,
            votes_against: 0,
            implementation_status: ImplementationStatus::Proposed,
        }
    }

    #[test]
    fn test_medium_needs_three_net_votes() {
        let gate = ConsensusGate;
        let mut active = ActiveProposals::default();
        active.insert(proposal("p1", Priority::Medium));
        assert_eq!(gate.record_vote(&mut active, "p1", true).unwrap(), VoteOutcome::Pending);
        assert_eq!(gate.record_vote(&mut active, "p1", true).unwrap(), VoteOutcome::Pending);
        assert_eq!(
            active.get("p1").unwrap().implementation_status,
            ImplementationStatus::Proposed
        );
        assert_eq!(gate.record_vote(&mut active, "p1", true).unwrap(), VoteOutcome::Approved);
        assert_eq!(
            active.get("p1").unwrap().implementation_status,
            ImplementationStatus::Approved
        );
    }

    #[test]
    fn test_thresholds_by_priority() {
        assert_eq!(voting_threshold(Priority::Critical), 1);
        assert_eq!(voting_threshold(Priority::High), 2);
        assert_eq!(voting_threshold(Priority::Medium), 3);
        assert_eq!(voting_threshold(Priority::Low), 5);
        assert_eq!(voting_threshold(Priority::Experimental), 7);
    }

    #[test]
    fn test_votes_against_reject() {
        let gate = ConsensusGate;
        let mut active = ActiveProposals::default();
        active.insert(proposal("p1", Priority::High));
        gate.record_vote(&mut active, "p1", true).unwrap();
        gate.record_vote(&mut active, "p1", false).unwrap();
        gate.record_vote(&mut active, "p1", false).unwrap();
        assert_eq!(gate.record_vote(&mut active, "p1", false).unwrap(), VoteOutcome::Rejected);
        let err = gate.record_vote(&mut active, "p1", true).unwrap_err();
        assert!(matches!(err, EvolutionError::InvalidState(_)));
    }

    #[test]
    fn test_unknown_and_approved_are_errors() {
        let gate = ConsensusGate;
        let mut active = ActiveProposals::default();
        assert!(matches!(
            gate.record_vote(&mut active, "nope", true),
            Err(EvolutionError::UnknownProposal(_))
        ));
        active.insert(proposal("p1", Priority::Critical));
        assert_eq!(gate.record_vote(&mut active, "p1", true).unwrap(), VoteOutcome::Approved);
        assert!(matches!(
            gate.record_vote(&mut active, "p1", true),
            Err(EvolutionError::InvalidState(_))
        ));
    }

    #[test]
    fn test_expiry_only_for_pending() {
        let gate = ConsensusGate;
        let mut p = proposal("p1", Priority::Low);
        p.created_timestamp = Utc::now() - Duration::hours(25);
        let max_age = Duration::hours(24);
        assert!(gate.is_expired(&p, Utc::now(), max_age));
        p.implementation_status = ImplementationStatus::Approved;
        assert!(!gate.is_expired(&p, Utc::now(), max_age));
    }

    #[test]
    fn test_active_keeps_creation_order() {
        let mut active = ActiveProposals::default();
        active.insert(proposal("a", Priority::Low));
        active.insert(proposal("b", Priority::Low));
        active.insert(proposal("c", Priority::Low));
        active.remove("b");
        let ids: Vec<_> = active.iter().map(|p| p.proposal_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(active.first().unwrap().proposal_id, "a");
    }
}
