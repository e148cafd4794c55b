//! The growth-loop engine: owns the original and live profile, the analysis window,
//! the pattern library, the active proposal set and every history log.
//!
//! All mutable state sits behind one mutex. Extraction and synthesis run on a
//! snapshot outside the lock; registration, votes, apply, reject and rollback are
//! each one critical section, so `apply` and `vote` can never interleave on the
//! same proposal.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use genesis_core::config::EvolutionConfig;
use genesis_core::observability;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::consensus::{ActiveProposals, ConsensusGate, VoteOutcome};
use crate::error::{EvolutionError, Result};
use crate::extractor::{ExtractionRule, InsightExtractor};
use crate::history::{
    self, HistoryEvent, HistoryRecord, HistorySink, ImplementedChange, RejectedProposal,
    RejectionReason, RollbackTarget,
};
use crate::patterns::{PatternLibrary, PatternTrend};
use crate::profile::Profile;
use crate::synth::ProposalSynthesizer;
use crate::types::{GrowthProposal, ImplementationStatus, Interaction};

// ─── Public value types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    Rapid,
    Standard,
    Deep,
}

impl CycleKind {
    pub const ALL: [CycleKind; 3] = [Self::Rapid, Self::Standard, Self::Deep];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rapid => "rapid",
            Self::Standard => "standard",
            Self::Deep => "deep",
        }
    }
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub kind: CycleKind,
    pub analyzed: usize,
    pub insights: usize,
    pub expired: Vec<String>,
    pub registered: Vec<String>,
    pub duplicates_suppressed: usize,
    /// Non-urgent proposals dropped by a rapid cycle.
    pub deferred: usize,
    /// Dropped because `max_active_proposals` was reached.
    pub over_capacity: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BehavioralAnalytics {
    pub total_interactions: u64,
    pub per_source: BTreeMap<String, u64>,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub active: bool,
    pub total_evolutions: usize,
    pub active_proposals_count: usize,
    pub rejected_proposals_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteReceipt {
    pub proposal_id: String,
    pub outcome: VoteOutcome,
    pub votes_for: u32,
    pub votes_against: u32,
    /// The approval was applied to the live profile in the same call.
    pub applied: bool,
}

// ─── State ──────────────────────────────────────────────────────────────────

struct EngineState {
    current: Profile,
    window: VecDeque<Interaction>,
    analytics: BehavioralAnalytics,
    library: PatternLibrary,
    active: ActiveProposals,
    history: Vec<HistoryEvent>,
    implemented: Vec<ImplementedChange>,
    rejected: Vec<RejectedProposal>,
    /// Ids that reached a terminal state; they never come back.
    decided: HashMap<String, ImplementationStatus>,
    /// Fingerprints of rejected change sets and when they were rejected. They block
    /// re-registration until standard/deep cycles prune them after `max_pending_age`.
    recently_rejected: HashMap<String, DateTime<Utc>>,
    stats: CycleStats,
}

impl EngineState {
    fn reject(&mut self, mut proposal: GrowthProposal, reason: RejectionReason) -> HistoryRecord {
        proposal.implementation_status = ImplementationStatus::Rejected;
        self.recently_rejected
            .insert(proposal.fingerprint(), Utc::now());
        let record = HistoryRecord::new(
            "proposal_rejected",
            &proposal.proposal_id,
            &reason.describe(),
            json!({
                "title": proposal.title,
                "votes_for": proposal.votes_for,
                "votes_against": proposal.votes_against,
            }),
        );
        self.decided
            .insert(proposal.proposal_id.clone(), ImplementationStatus::Rejected);
        self.rejected.push(RejectedProposal {
            proposal,
            rejected_timestamp: Utc::now(),
            reason,
        });
        record
    }
}

// ─── Builder ────────────────────────────────────────────────────────────────

pub struct EngineBuilder {
    original: Profile,
    config: EvolutionConfig,
    rules: Option<Vec<ExtractionRule>>,
    sinks: Vec<Arc<dyn HistorySink>>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EvolutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the bundled seed rules.
    pub fn rules(mut self, rules: Vec<ExtractionRule>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn build(self) -> anyhow::Result<EvolutionEngine> {
        let config = self.config.sanitized();
        let rules = match self.rules {
            Some(r) => r,
            None => crate::seed::seed_rules()?,
        };
        let extractor =
            InsightExtractor::new(rules, config.min_insight_strength, config.min_sample_size)?;
        let synthesizer = ProposalSynthesizer::new(config.significance_threshold);
        let state = EngineState {
            current: self.original.clone(),
            window: VecDeque::new(),
            analytics: BehavioralAnalytics::default(),
            library: PatternLibrary::new(config.pattern_bucket_cap),
            active: ActiveProposals::default(),
            history: Vec::new(),
            implemented: Vec::new(),
            rejected: Vec::new(),
            decided: HashMap::new(),
            recently_rejected: HashMap::new(),
            stats: CycleStats::default(),
        };
        Ok(EvolutionEngine {
            config,
            extractor,
            synthesizer,
            gate: ConsensusGate,
            original: self.original,
            state: Mutex::new(state),
            active: AtomicBool::new(false),
            sinks: self.sinks,
        })
    }
}

// ─── Engine ─────────────────────────────────────────────────────────────────

pub struct EvolutionEngine {
    config: EvolutionConfig,
    extractor: InsightExtractor,
    synthesizer: ProposalSynthesizer,
    gate: ConsensusGate,
    original: Profile,
    state: Mutex<EngineState>,
    active: AtomicBool,
    sinks: Vec<Arc<dyn HistorySink>>,
}

impl EvolutionEngine {
    pub fn builder(original: Profile) -> EngineBuilder {
        EngineBuilder {
            original,
            config: EvolutionConfig::default(),
            rules: None,
            sinks: Vec::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    pub fn initialize(&self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            tracing::info!(rules = self.extractor.rule_count(), "Evolution engine initialized");
            self.emit(vec![HistoryRecord::new("engine_started", "", "", Value::Null)]);
        }
    }

    pub fn shutdown(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            let status = self.status();
            tracing::info!(
                total_evolutions = status.total_evolutions,
                active_proposals = status.active_proposals_count,
                "Evolution engine stopped"
            );
            self.emit(vec![HistoryRecord::new("engine_stopped", "", "", Value::Null)]);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    // ─── Ingest ─────────────────────────────────────────────────────────────

    /// Append to the bounded analysis window. Never waits on analysis beyond the
    /// state lock.
    pub fn ingest(&self, interaction: Interaction) {
        let cap = self.config.interaction_window_cap;
        let mut st = self.lock();
        st.analytics.total_interactions += 1;
        *st
            .analytics
            .per_source
            .entry(interaction.source.clone())
            .or_insert(0) += 1;
        st.analytics.last_seen = Some(match st.analytics.last_seen {
            Some(prev) if prev > interaction.timestamp => prev,
            _ => interaction.timestamp,
        });
        st.window.push_back(interaction);
        while st.window.len() > cap {
            st.window.pop_front();
        }
    }

    // ─── Cycles ─────────────────────────────────────────────────────────────

    /// Expiry (standard/deep) → extraction over the kind's window → filing →
    /// synthesis → registration.
    pub fn run_cycle(&self, kind: CycleKind) -> Result<CycleReport> {
        let result = self.run_cycle_inner(kind);
        let mut st = self.lock();
        match &result {
            Ok(report) => {
                st.stats.completed += 1;
                tracing::debug!(
                    cycle = %kind,
                    cycle_id = %report.cycle_id,
                    analyzed = report.analyzed,
                    insights = report.insights,
                    registered = report.registered.len(),
                    "Evolution cycle finished"
                );
            }
            Err(_) => st.stats.failed += 1,
        }
        result
    }

    pub(crate) fn record_cycle_failure(&self) {
        self.lock().stats.failed += 1;
    }

    fn run_cycle_inner(&self, kind: CycleKind) -> Result<CycleReport> {
        let cycle_id = Uuid::new_v4().to_string();
        let mut records = Vec::new();

        let (snapshot, expired) = {
            let mut st = self.lock();
            let mut expired = Vec::new();
            if kind != CycleKind::Rapid {
                let now = Utc::now();
                let max_age = self.max_pending_age();
                st.recently_rejected
                    .retain(|_, at| now.signed_duration_since(*at) <= max_age);
                for proposal in self.take_expired(&mut st) {
                    expired.push(proposal.proposal_id.clone());
                    records.push(st.reject(proposal, RejectionReason::Expired));
                }
            }
            let window = match kind {
                CycleKind::Rapid => self.config.rapid_window,
                CycleKind::Standard => self.config.standard_window,
                CycleKind::Deep => st.window.len(),
            };
            let skip = st.window.len().saturating_sub(window);
            let snapshot: Vec<Interaction> = st.window.iter().skip(skip).cloned().collect();
            (snapshot, expired)
        };
        self.emit(std::mem::take(&mut records));

        let insights = self.extractor.extract(&snapshot);

        let long_horizon: Vec<(Vec<_>, PatternTrend)> = {
            let mut st = self.lock();
            for insight in &insights {
                st.library.file(insight.clone());
            }
            let mut groups = Vec::new();
            // Only types still observed inside the retained window.
            let window_start = st.window.iter().map(|i| i.timestamp).min();
            if let (CycleKind::Deep, Some(start)) = (kind, window_start) {
                for t in st.library.insight_types() {
                    match st.library.trend(&t) {
                        Some(trend) if trend.latest >= start => {
                            groups.push((st.library.retained(&t), trend));
                        }
                        _ => {}
                    }
                }
            }
            groups
        };

        let candidates = if kind == CycleKind::Deep {
            let mut out = Vec::new();
            for (group, trend) in &long_horizon {
                if let Some(p) = self.synthesizer.synthesize_group(group, Some(trend))? {
                    out.push(p);
                }
            }
            out
        } else {
            self.synthesizer.synthesize(&insights)?
        };

        let mut report = CycleReport {
            cycle_id: cycle_id.clone(),
            kind,
            analyzed: snapshot.len(),
            insights: insights.len(),
            expired,
            registered: Vec::new(),
            duplicates_suppressed: 0,
            deferred: 0,
            over_capacity: 0,
        };

        {
            let mut st = self.lock();
            let mut seen_ids = HashSet::new();
            for p in &candidates {
                if st.active.contains(&p.proposal_id)
                    || st.decided.contains_key(&p.proposal_id)
                    || !seen_ids.insert(p.proposal_id.as_str())
                {
                    return Err(EvolutionError::IdCollision(p.proposal_id.clone()));
                }
            }
            let mut blocked: HashSet<String> = st.recently_rejected.keys().cloned().collect();
            blocked.extend(st.active.iter().map(GrowthProposal::fingerprint));
            // One live proposal per profile path.
            let mut claimed: HashSet<String> = st
                .active
                .iter()
                .flat_map(|p| p.proposed_changes.keys().cloned())
                .collect();

            for proposal in candidates {
                if kind == CycleKind::Rapid && !proposal.priority.is_urgent() {
                    report.deferred += 1;
                    continue;
                }
                if !blocked.insert(proposal.fingerprint())
                    || proposal.proposed_changes.keys().any(|k| claimed.contains(k))
                {
                    report.duplicates_suppressed += 1;
                    continue;
                }
                if st.active.len() >= self.config.max_active_proposals {
                    report.over_capacity += 1;
                    continue;
                }
                tracing::info!(
                    proposal_id = %proposal.proposal_id,
                    priority = %proposal.priority,
                    confidence = proposal.confidence_score,
                    "Growth proposal registered: {}",
                    proposal.title
                );
                records.push(HistoryRecord::new(
                    "proposal_registered",
                    &proposal.proposal_id,
                    &format!("{} cycle {}", kind, cycle_id),
                    json!({
                        "title": proposal.title,
                        "evolution_type": proposal.evolution_type,
                        "priority": proposal.priority,
                        "confidence_score": proposal.confidence_score,
                        "proposed_changes": proposal.proposed_changes,
                    }),
                ));
                report.registered.push(proposal.proposal_id.clone());
                claimed.extend(proposal.proposed_changes.keys().cloned());
                st.active.insert(proposal);
            }
        }
        if report.over_capacity > 0 {
            tracing::warn!(
                dropped = report.over_capacity,
                cap = self.config.max_active_proposals,
                "Active proposal limit reached"
            );
        }
        self.emit(records);
        Ok(report)
    }

    fn max_pending_age(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.max_pending_age)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100))
    }

    fn take_expired(&self, st: &mut EngineState) -> Vec<GrowthProposal> {
        let max_age = self.max_pending_age();
        let now = Utc::now();
        let ids: Vec<String> = st
            .active
            .iter()
            .filter(|p| self.gate.is_expired(p, now, max_age))
            .map(|p| p.proposal_id.clone())
            .collect();
        ids.iter().filter_map(|id| st.active.remove(id)).collect()
    }

    // ─── Votes and transitions ──────────────────────────────────────────────

    pub fn vote(&self, proposal_id: &str, approve: bool) -> Result<VoteReceipt> {
        let mut records = Vec::new();
        let receipt = {
            let mut st = self.lock();
            if let Some(status) = st.decided.get(proposal_id) {
                return Err(EvolutionError::InvalidState(format!(
                    "proposal {} is already {}",
                    proposal_id, status
                )));
            }
            let outcome = self.gate.record_vote(&mut st.active, proposal_id, approve)?;
            let (votes_for, votes_against) = st
                .active
                .get(proposal_id)
                .map(|p| (p.votes_for, p.votes_against))
                .unwrap_or_default();
            let mut applied = false;
            match outcome {
                VoteOutcome::Pending => {}
                VoteOutcome::Approved => {
                    tracing::info!(proposal_id, votes_for, votes_against, "Proposal approved");
                    records.push(HistoryRecord::new(
                        "proposal_approved",
                        proposal_id,
                        "votes",
                        json!({"votes_for": votes_for, "votes_against": votes_against}),
                    ));
                    if self.config.auto_apply {
                        match Self::apply_locked(&mut st, proposal_id) {
                            Ok(change) => {
                                applied = true;
                                records.push(implemented_record(&change));
                            }
                            Err(e) => tracing::warn!(
                                proposal_id,
                                error = %e,
                                "Auto-apply failed, proposal stays approved"
                            ),
                        }
                    }
                }
                VoteOutcome::Rejected => {
                    if let Some(p) = st.active.remove(proposal_id) {
                        tracing::info!(proposal_id, votes_for, votes_against, "Proposal rejected");
                        records.push(st.reject(p, RejectionReason::Consensus));
                    }
                }
            }
            VoteReceipt {
                proposal_id: proposal_id.to_string(),
                outcome,
                votes_for,
                votes_against,
                applied,
            }
        };
        self.emit(records);
        Ok(receipt)
    }

    /// Apply an approved proposal to the live profile: every path or none.
    pub fn apply(&self, proposal_id: &str) -> Result<ImplementedChange> {
        let change = {
            let mut st = self.lock();
            Self::apply_locked(&mut st, proposal_id)?
        };
        self.emit(vec![implemented_record(&change)]);
        Ok(change)
    }

    fn apply_locked(st: &mut EngineState, proposal_id: &str) -> Result<ImplementedChange> {
        if let Some(status) = st.decided.get(proposal_id) {
            return Err(EvolutionError::InvalidState(format!(
                "proposal {} is already {}",
                proposal_id, status
            )));
        }
        let proposal = st
            .active
            .get(proposal_id)
            .ok_or_else(|| EvolutionError::UnknownProposal(proposal_id.to_string()))?;
        if proposal.implementation_status != ImplementationStatus::Approved {
            return Err(EvolutionError::InvalidState(format!(
                "proposal {} is {}, only approved proposals can be applied",
                proposal_id, proposal.implementation_status
            )));
        }
        let diff = st.current.apply_changes(&proposal.proposed_changes)?;

        let mut proposal = st
            .active
            .remove(proposal_id)
            .ok_or_else(|| EvolutionError::UnknownProposal(proposal_id.to_string()))?;
        proposal.implementation_status = ImplementationStatus::Implemented;
        let change = ImplementedChange {
            proposal,
            applied_timestamp: Utc::now(),
            resulting_diff: diff,
        };
        st.decided
            .insert(proposal_id.to_string(), ImplementationStatus::Implemented);
        st.history.push(HistoryEvent::Implemented(change.clone()));
        st.implemented.push(change.clone());
        tracing::info!(
            proposal_id,
            paths = change.resulting_diff.entries.len(),
            "Proposal implemented"
        );
        Ok(change)
    }

    /// Manually reject a proposed or approved proposal.
    pub fn reject(&self, proposal_id: &str, reason: &str) -> Result<RejectedProposal> {
        let (rejected, record) = {
            let mut st = self.lock();
            if let Some(status) = st.decided.get(proposal_id) {
                return Err(EvolutionError::InvalidState(format!(
                    "proposal {} is already {}",
                    proposal_id, status
                )));
            }
            let proposal = st
                .active
                .remove(proposal_id)
                .ok_or_else(|| EvolutionError::UnknownProposal(proposal_id.to_string()))?;
            let record = st.reject(proposal, RejectionReason::Manual(reason.to_string()));
            let rejected = st.rejected.last().cloned().ok_or_else(|| {
                EvolutionError::InvalidState("rejection log is empty".to_string())
            })?;
            (rejected, record)
        };
        tracing::info!(proposal_id, reason, "Proposal rejected manually");
        self.emit(vec![record]);
        Ok(rejected)
    }

    /// Rebuild the live profile from the original plus the changes that were live
    /// at `target`. The original is never touched; the rollback itself becomes a
    /// history event.
    pub fn rollback(&self, target: RollbackTarget) -> Result<Profile> {
        let (profile, record) = {
            let mut st = self.lock();
            let cutoff = history::rollback_cutoff(&st.history, target)?;
            let rebuilt = history::replay(&self.original, &st.history, cutoff)?;
            let replayed: Vec<String> = history::effective_changes(&st.history, cutoff)
                .into_iter()
                .filter_map(|i| match &st.history[i] {
                    HistoryEvent::Implemented(c) => Some(c.proposal.proposal_id.clone()),
                    HistoryEvent::RolledBack { .. } => None,
                })
                .collect();
            let record = HistoryRecord::new(
                "rollback",
                "",
                &format!("{:?}", target),
                json!({ "replayed": replayed }),
            );
            st.history.push(HistoryEvent::RolledBack {
                target,
                replayed,
                timestamp: Utc::now(),
            });
            st.current = rebuilt.clone();
            (rebuilt, record)
        };
        tracing::info!(?target, "Profile rolled back");
        self.emit(vec![record]);
        Ok(profile)
    }

    /// Recompute the live profile from the original and the history log.
    pub fn replay_history(&self) -> Result<Profile> {
        let st = self.lock();
        history::replay(&self.original, &st.history, st.history.len())
    }

    // ─── Reads ──────────────────────────────────────────────────────────────

    pub fn status(&self) -> EngineStatus {
        let st = self.lock();
        EngineStatus {
            active: self.is_active(),
            total_evolutions: st.implemented.len(),
            active_proposals_count: st.active.len(),
            rejected_proposals_count: st.rejected.len(),
        }
    }

    pub fn list_active_proposals(&self) -> Vec<GrowthProposal> {
        self.lock().active.iter().cloned().collect()
    }

    pub fn get_current_profile(&self) -> Profile {
        self.lock().current.clone()
    }

    pub fn original_profile(&self) -> &Profile {
        &self.original
    }

    pub fn check_evolution_triggers(&self) -> bool {
        !self.lock().active.is_empty()
    }

    /// First active proposal (creation order) as JSON.
    pub fn generate_evolution_proposal(&self) -> Option<Value> {
        let st = self.lock();
        st.active
            .first()
            .and_then(|p| serde_json::to_value(p).ok())
    }

    pub fn implemented_changes(&self) -> Vec<ImplementedChange> {
        self.lock().implemented.clone()
    }

    pub fn rejected_proposals(&self) -> Vec<RejectedProposal> {
        self.lock().rejected.clone()
    }

    pub fn evolution_history(&self) -> Vec<HistoryEvent> {
        self.lock().history.clone()
    }

    pub fn pattern_trend(&self, insight_type: &str) -> Option<PatternTrend> {
        self.lock().library.trend(insight_type)
    }

    pub fn behavioral_analytics(&self) -> BehavioralAnalytics {
        self.lock().analytics.clone()
    }

    pub fn cycle_stats(&self) -> CycleStats {
        self.lock().stats
    }

    // ─── Sinks ──────────────────────────────────────────────────────────────

    fn emit(&self, records: Vec<HistoryRecord>) {
        for record in &records {
            observability::audit_evolution_event(
                &record.event_type,
                &record.target_id,
                &record.reason,
            );
            for sink in &self.sinks {
                if let Err(e) = sink.append(record) {
                    tracing::warn!(
                        sink = sink.name(),
                        event = %record.event_type,
                        error = %e,
                        "Failed to append history record"
                    );
                }
            }
        }
    }
}

fn implemented_record(change: &ImplementedChange) -> HistoryRecord {
    HistoryRecord::new(
        "proposal_implemented",
        &change.proposal.proposal_id,
        &change.proposal.title,
        json!({ "diff": change.resulting_diff }),
    )
}
